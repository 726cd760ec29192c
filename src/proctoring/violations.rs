//! Violation counting, the tab-switch threshold and per-kind notices.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use super::environment::InterceptedInput;

/// Tab switches allowed before the exam is submitted automatically.
pub const TAB_SWITCH_LIMIT: u32 = 3;

const DEFAULT_NOTICE_TTL: Duration = Duration::from_millis(2_000);
const TAB_SWITCH_NOTICE_TTL: Duration = Duration::from_millis(3_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    TabSwitch,
    CopyPaste,
    RightClick,
    KeyboardShortcut,
    FullscreenExit,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 5] = [
        Self::TabSwitch,
        Self::CopyPaste,
        Self::RightClick,
        Self::KeyboardShortcut,
        Self::FullscreenExit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TabSwitch => "tabSwitch",
            Self::CopyPaste => "copyPaste",
            Self::RightClick => "rightClick",
            Self::KeyboardShortcut => "keyboardShortcut",
            Self::FullscreenExit => "fullscreenExit",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::TabSwitch => 0,
            Self::CopyPaste => 1,
            Self::RightClick => 2,
            Self::KeyboardShortcut => 3,
            Self::FullscreenExit => 4,
        }
    }
}

impl From<InterceptedInput> for ViolationKind {
    fn from(input: InterceptedInput) -> Self {
        match input {
            InterceptedInput::Copy | InterceptedInput::Paste | InterceptedInput::Cut => {
                Self::CopyPaste
            }
            InterceptedInput::ContextMenu => Self::RightClick,
            InterceptedInput::KeyCombo(_) => Self::KeyboardShortcut,
        }
    }
}

/// Per-kind counters. Never decrease within a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationLog {
    counts: [u32; 5],
}

impl ViolationLog {
    pub fn count(&self, kind: ViolationKind) -> u32 {
        self.counts[kind.index()]
    }

    pub fn tab_switches(&self) -> u32 {
        self.count(ViolationKind::TabSwitch)
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    fn increment(&mut self, kind: ViolationKind) -> u32 {
        let slot = &mut self.counts[kind.index()];
        *slot = slot.saturating_add(1);
        *slot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NoticeId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: NoticeId,
    pub kind: ViolationKind,
    pub text: String,
    pub ttl: Duration,
}

/// What changed on screen after posting a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeUpdate {
    pub replaced: Option<NoticeId>,
    pub shown: Notice,
}

/// At most one visible notice per violation kind.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    next_id: u64,
    active: HashMap<ViolationKind, NoticeId>,
}

impl NoticeBoard {
    pub fn post(&mut self, kind: ViolationKind, text: String) -> NoticeUpdate {
        self.next_id += 1;
        let id = NoticeId(self.next_id);
        let replaced = self.active.insert(kind, id);
        NoticeUpdate { replaced, shown: Notice { id, kind, text, ttl: notice_ttl(kind) } }
    }

    /// Clears the slot only if `id` is still the visible notice for `kind`.
    pub fn dismiss(&mut self, kind: ViolationKind, id: NoticeId) -> bool {
        if self.active.get(&kind) == Some(&id) {
            self.active.remove(&kind);
            true
        } else {
            false
        }
    }

    pub fn dismiss_all(&mut self) -> Vec<NoticeId> {
        let mut ids: Vec<NoticeId> = self.active.drain().map(|(_, id)| id).collect();
        ids.sort();
        ids
    }

    pub fn active(&self, kind: ViolationKind) -> Option<NoticeId> {
        self.active.get(&kind).copied()
    }

    pub fn visible(&self) -> usize {
        self.active.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub kind: ViolationKind,
    pub count: u32,
    pub threshold_breached: bool,
    pub notice: NoticeUpdate,
}

#[derive(Debug, Default)]
pub struct ViolationMonitor {
    log: ViolationLog,
    notices: NoticeBoard,
    sealed: bool,
}

impl ViolationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one violation. Returns `None` once sealed.
    pub fn record(&mut self, kind: ViolationKind) -> Option<Recorded> {
        if self.sealed {
            tracing::debug!(kind = kind.as_str(), "Violation dropped, submission pending");
            return None;
        }

        let count = self.log.increment(kind);
        let threshold_breached = kind == ViolationKind::TabSwitch && count == TAB_SWITCH_LIMIT;
        let notice = self.notices.post(kind, notice_text(kind, count));

        metrics::counter!(crate::core::metrics::VIOLATIONS_TOTAL, "kind" => kind.as_str()).increment(1);
        tracing::warn!(kind = kind.as_str(), count, threshold_breached, "Violation recorded");

        Some(Recorded { kind, count, threshold_breached, notice })
    }

    /// Stops accepting violations; called when a submission is latched.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn log(&self) -> &ViolationLog {
        &self.log
    }

    /// Never negative, even after the counter passes the limit.
    pub fn tab_switches_remaining(&self) -> u32 {
        TAB_SWITCH_LIMIT.saturating_sub(self.log.tab_switches())
    }

    pub fn dismiss(&mut self, kind: ViolationKind, id: NoticeId) -> bool {
        self.notices.dismiss(kind, id)
    }

    pub fn dismiss_all(&mut self) -> Vec<NoticeId> {
        self.notices.dismiss_all()
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }
}

pub fn notice_text(kind: ViolationKind, count: u32) -> String {
    match kind {
        ViolationKind::TabSwitch => format!(
            "Warning: you've switched tabs {count}/{TAB_SWITCH_LIMIT} times. After \
             {TAB_SWITCH_LIMIT} switches, your exam will be submitted automatically."
        ),
        ViolationKind::CopyPaste => "Copy-paste is not allowed during the exam!".to_string(),
        ViolationKind::RightClick => "Right-click is not allowed during the exam!".to_string(),
        ViolationKind::KeyboardShortcut => {
            "Keyboard shortcuts are not allowed during the exam!".to_string()
        }
        ViolationKind::FullscreenExit => {
            "You must stay in fullscreen mode to continue the exam!".to_string()
        }
    }
}

fn notice_ttl(kind: ViolationKind) -> Duration {
    match kind {
        ViolationKind::TabSwitch => TAB_SWITCH_NOTICE_TTL,
        _ => DEFAULT_NOTICE_TTL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_breached_exactly_once_at_third_switch() {
        let mut monitor = ViolationMonitor::new();
        let breaches: Vec<bool> = (0..7)
            .map(|_| monitor.record(ViolationKind::TabSwitch).expect("recorded").threshold_breached)
            .collect();

        assert_eq!(breaches, vec![false, false, true, false, false, false, false]);
        assert_eq!(monitor.log().tab_switches(), 7);
        assert_eq!(monitor.tab_switches_remaining(), 0);
    }

    #[test]
    fn other_kinds_never_breach() {
        let mut monitor = ViolationMonitor::new();
        for kind in ViolationKind::ALL.into_iter().filter(|kind| *kind != ViolationKind::TabSwitch)
        {
            for _ in 0..5 {
                assert!(!monitor.record(kind).expect("recorded").threshold_breached);
            }
        }
        assert_eq!(monitor.log().total(), 20);
        assert_eq!(monitor.tab_switches_remaining(), TAB_SWITCH_LIMIT);
    }

    #[test]
    fn tab_switch_text_reports_progress() {
        let mut monitor = ViolationMonitor::new();
        monitor.record(ViolationKind::TabSwitch);
        let second = monitor.record(ViolationKind::TabSwitch).expect("recorded");

        assert_eq!(
            second.notice.shown.text,
            "Warning: you've switched tabs 2/3 times. After 3 switches, your exam will be \
             submitted automatically."
        );
        assert_eq!(second.notice.shown.ttl, Duration::from_secs(3));
    }

    #[test]
    fn repeated_kind_replaces_visible_notice() {
        let mut monitor = ViolationMonitor::new();
        let first = monitor.record(ViolationKind::CopyPaste).expect("recorded");
        let second = monitor.record(ViolationKind::CopyPaste).expect("recorded");
        let other = monitor.record(ViolationKind::RightClick).expect("recorded");

        assert_eq!(first.notice.replaced, None);
        assert_eq!(second.notice.replaced, Some(first.notice.shown.id));
        assert_eq!(other.notice.replaced, None);
        assert_eq!(monitor.notices().visible(), 2);
        assert_eq!(monitor.notices().active(ViolationKind::CopyPaste), Some(second.notice.shown.id));
    }

    #[test]
    fn stale_dismissal_keeps_newer_notice() {
        let mut monitor = ViolationMonitor::new();
        let first = monitor.record(ViolationKind::KeyboardShortcut).expect("recorded");
        let second = monitor.record(ViolationKind::KeyboardShortcut).expect("recorded");

        assert!(!monitor.dismiss(ViolationKind::KeyboardShortcut, first.notice.shown.id));
        assert_eq!(monitor.notices().visible(), 1);
        assert!(monitor.dismiss(ViolationKind::KeyboardShortcut, second.notice.shown.id));
        assert_eq!(monitor.notices().visible(), 0);
    }

    #[test]
    fn sealed_monitor_drops_events() {
        let mut monitor = ViolationMonitor::new();
        monitor.record(ViolationKind::TabSwitch);
        monitor.seal();

        assert!(monitor.record(ViolationKind::TabSwitch).is_none());
        assert!(monitor.record(ViolationKind::CopyPaste).is_none());
        assert_eq!(monitor.log().total(), 1);
    }

    #[test]
    fn dismiss_all_clears_board() {
        let mut monitor = ViolationMonitor::new();
        monitor.record(ViolationKind::TabSwitch);
        monitor.record(ViolationKind::RightClick);

        let ids = monitor.dismiss_all();
        assert_eq!(ids.len(), 2);
        assert_eq!(monitor.notices().visible(), 0);
    }

    #[test]
    fn intercepted_inputs_map_to_kinds() {
        assert_eq!(ViolationKind::from(InterceptedInput::Cut), ViolationKind::CopyPaste);
        assert_eq!(ViolationKind::from(InterceptedInput::ContextMenu), ViolationKind::RightClick);
        assert_eq!(
            ViolationKind::from(InterceptedInput::KeyCombo('a')),
            ViolationKind::KeyboardShortcut
        );
    }
}

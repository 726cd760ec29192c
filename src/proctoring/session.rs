//! The proctored exam session state machine.
//!
//! [`ProctoringSession::handle`] is a synchronous transition function: it
//! consumes one [`SessionInput`], updates the owned monitor, timer and
//! answers, and returns the [`SessionEffect`]s the runner must carry out.
//! It never touches the environment or the network itself.

use super::model::{AnswerError, AnswerSet, ExamSession, Role, Route, SubmissionReceipt};
use super::timer::{TickSource, TimerEngine, TimerSignal, LOW_TIME_THRESHOLD};
use super::violations::{Notice, NoticeId, Recorded, ViolationKind, ViolationLog, ViolationMonitor};
use super::environment::EnvEvent;
use crate::core::errors::ProctorError;

const TIME_EXPIRED_GRACE_SECONDS: u32 = 5;
const TAB_SWITCH_GRACE_SECONDS: u32 = 10;

pub const LOW_TIME_NOTICE: &str = "Only 30 seconds remaining! Submit your exam soon!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    AwaitingFullscreen,
    Active,
    AutoSubmitPending,
    ManualSubmitPending,
    Terminated,
    /// Author preview: read-only, no timer, no proctoring, submit disabled.
    ViewOnly,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingFullscreen => "awaiting_fullscreen",
            Self::Active => "active",
            Self::AutoSubmitPending => "auto_submit_pending",
            Self::ManualSubmitPending => "manual_submit_pending",
            Self::Terminated => "terminated",
            Self::ViewOnly => "view_only",
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Terminated | Self::ViewOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSubmitReason {
    TimeExpired,
    TabSwitchLimit,
}

impl AutoSubmitReason {
    pub fn grace_seconds(self) -> u32 {
        match self {
            Self::TimeExpired => TIME_EXPIRED_GRACE_SECONDS,
            Self::TabSwitchLimit => TAB_SWITCH_GRACE_SECONDS,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::TimeExpired => "Time's Up!",
            Self::TabSwitchLimit => "Exam Auto-Submitted",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::TimeExpired => {
                "Your exam has been automatically submitted due to time expiration."
            }
            Self::TabSwitchLimit => {
                "Your exam has been automatically submitted due to switching tabs 3 times."
            }
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::TimeExpired => "time_expired",
            Self::TabSwitchLimit => "tab_switch_limit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Auto(AutoSubmitReason),
}

impl SubmitTrigger {
    pub fn is_auto(self) -> bool {
        matches!(self, Self::Auto(_))
    }

    fn grace_seconds(self) -> u32 {
        match self {
            Self::Manual => 0,
            Self::Auto(reason) => reason.grace_seconds(),
        }
    }

    fn pending_status(self) -> SessionStatus {
        match self {
            Self::Manual => SessionStatus::ManualSubmitPending,
            Self::Auto(_) => SessionStatus::AutoSubmitPending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Environment(EnvEvent),
    FullscreenEntered,
    FullscreenFailed(ProctorError),
    Tick(TickSource),
    GraceTick,
    SubmitRequested,
    NoticeExpired { kind: ViolationKind, id: NoticeId },
    SubmissionResolved(Result<SubmissionReceipt, ProctorError>),
    Teardown,
}

/// Something the screen should reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    StatusChanged(SessionStatus),
    FullscreenPrompt { retry_message: Option<String> },
    Blocking(String),
    Clock { remaining_seconds: u32, low_time: bool },
    LowTimeWarning(String),
    NoticeShown(Notice),
    NoticeDismissed(NoticeId),
    Summary(SessionSnapshot),
    GraceCountdown { title: String, message: String, seconds_left: u32 },
    AnswerRecorded { index: usize, option: String },
    AnswerRejected(String),
    SubmissionConfirmed(String),
    /// Persistent: stays until the user or an operator acts.
    SubmissionFailed { message: String, relogin: bool },
    Navigate(Route),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    ArmTicker(TickSource),
    DisarmTicker,
    ArmGrace,
    DisarmGrace,
    Submit { auto: bool },
    ReleaseFullscreen,
    RevokeSubscriptions,
    Present(UiUpdate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GraceCountdown {
    trigger: SubmitTrigger,
    seconds_left: u32,
}

/// Read-only view for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub remaining_seconds: u32,
    pub timer_running: bool,
    pub tab_switches_remaining: u32,
    pub answered: usize,
    pub question_count: usize,
    pub grace_seconds_left: Option<u32>,
    pub submit_enabled: bool,
}

#[derive(Debug)]
pub struct ProctoringSession {
    exam: ExamSession,
    role: Role,
    status: SessionStatus,
    answers: AnswerSet,
    monitor: ViolationMonitor,
    timer: TimerEngine,
    /// Set on the first fullscreen entry; proctoring stays on afterwards.
    activated: bool,
    grace: Option<GraceCountdown>,
    trigger: Option<SubmitTrigger>,
    submit_dispatched: bool,
    teardown_requested: bool,
    outcome: Option<Result<SubmissionReceipt, ProctorError>>,
}

impl ProctoringSession {
    pub fn new(exam: ExamSession, role: Role) -> Self {
        let status = match role {
            Role::Student => SessionStatus::AwaitingFullscreen,
            Role::Author => SessionStatus::ViewOnly,
        };
        let answers = AnswerSet::for_questions(exam.questions());
        let timer = TimerEngine::initialize(exam.time_limit_seconds());

        tracing::info!(
            exam_id = exam.exam_id(),
            attempt_id = %exam.attempt_id(),
            role = ?role,
            questions = exam.questions().len(),
            time_limit_seconds = exam.time_limit_seconds(),
            started_at = %crate::core::time::format_offset(exam.started_at()),
            status = status.as_str(),
            "Proctoring session created"
        );

        Self {
            exam,
            role,
            status,
            answers,
            monitor: ViolationMonitor::new(),
            timer,
            activated: false,
            grace: None,
            trigger: None,
            submit_dispatched: false,
            teardown_requested: false,
            outcome: None,
        }
    }

    pub fn exam(&self) -> &ExamSession {
        &self.exam
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    pub fn violations(&self) -> &ViolationLog {
        self.monitor.log()
    }

    pub fn monitor(&self) -> &ViolationMonitor {
        &self.monitor
    }

    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    pub fn trigger(&self) -> Option<SubmitTrigger> {
        self.trigger
    }

    pub fn outcome(&self) -> Option<&Result<SubmissionReceipt, ProctorError>> {
        self.outcome.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            remaining_seconds: self.timer.remaining_seconds(),
            timer_running: self.timer.is_running(),
            tab_switches_remaining: self.monitor.tab_switches_remaining(),
            answered: self.answers.answered(),
            question_count: self.answers.len(),
            grace_seconds_left: self.grace.map(|grace| grace.seconds_left),
            submit_enabled: self.role == Role::Student && self.status == SessionStatus::Active,
        }
    }

    /// The only way answers change. Allowed while the exam is on screen.
    pub fn select_answer(&mut self, index: usize, option: &str) -> Result<(), AnswerError> {
        if self.status != SessionStatus::Active {
            return Err(AnswerError::SessionLocked);
        }
        self.answers.select(self.exam.questions(), index, option)
    }

    pub fn handle(&mut self, input: SessionInput) -> Vec<SessionEffect> {
        if self.status.is_final() {
            tracing::trace!(status = self.status.as_str(), ?input, "Input ignored");
            return Vec::new();
        }

        let mut effects = Vec::new();
        match input {
            SessionInput::Environment(event) => self.on_environment(event, &mut effects),
            SessionInput::FullscreenEntered => self.on_fullscreen_entered(&mut effects),
            SessionInput::FullscreenFailed(err) => self.on_fullscreen_failed(err, &mut effects),
            SessionInput::Tick(source) => self.on_tick(source, &mut effects),
            SessionInput::GraceTick => self.on_grace_tick(&mut effects),
            SessionInput::SubmitRequested => {
                if self.status == SessionStatus::Active {
                    self.enter_submit_pending(SubmitTrigger::Manual, &mut effects);
                }
            }
            SessionInput::NoticeExpired { kind, id } => {
                if self.monitor.dismiss(kind, id) {
                    effects.push(SessionEffect::Present(UiUpdate::NoticeDismissed(id)));
                }
            }
            SessionInput::SubmissionResolved(result) => self.on_resolved(result, &mut effects),
            SessionInput::Teardown => self.on_teardown(&mut effects),
        }
        effects
    }

    fn on_environment(&mut self, event: EnvEvent, effects: &mut Vec<SessionEffect>) {
        match self.status {
            SessionStatus::Active => {}
            // Out of fullscreen after the exam was shown: the clock is paused
            // but tab switches and blocked input still count.
            SessionStatus::AwaitingFullscreen if self.activated => {}
            _ => return,
        }

        match event {
            EnvEvent::VisibilityChanged { hidden: true } => {
                if let Some(recorded) = self.monitor.record(ViolationKind::TabSwitch) {
                    let breached = recorded.threshold_breached;
                    present_recorded(recorded, effects);
                    if breached {
                        self.enter_submit_pending(
                            SubmitTrigger::Auto(AutoSubmitReason::TabSwitchLimit),
                            effects,
                        );
                    }
                }
            }
            EnvEvent::VisibilityChanged { hidden: false } => {}
            EnvEvent::FullscreenChanged { active: false } => {
                if self.status != SessionStatus::Active {
                    return;
                }
                self.timer.stop();
                effects.push(SessionEffect::DisarmTicker);
                if let Some(recorded) = self.monitor.record(ViolationKind::FullscreenExit) {
                    present_recorded(recorded, effects);
                }
                self.set_status(SessionStatus::AwaitingFullscreen, effects);
                effects.push(SessionEffect::Present(UiUpdate::FullscreenPrompt {
                    retry_message: None,
                }));
            }
            EnvEvent::FullscreenChanged { active: true } => {}
            EnvEvent::Input(input) => {
                if let Some(recorded) = self.monitor.record(ViolationKind::from(input)) {
                    present_recorded(recorded, effects);
                }
            }
        }
    }

    fn on_fullscreen_entered(&mut self, effects: &mut Vec<SessionEffect>) {
        if self.status != SessionStatus::AwaitingFullscreen {
            return;
        }

        self.activated = true;
        self.set_status(SessionStatus::Active, effects);
        match self.timer.start() {
            Some(source) => {
                effects.push(SessionEffect::ArmTicker(source));
                effects.push(self.clock_update());
            }
            None => self.enter_submit_pending(
                SubmitTrigger::Auto(AutoSubmitReason::TimeExpired),
                effects,
            ),
        }
    }

    fn on_fullscreen_failed(&mut self, err: ProctorError, effects: &mut Vec<SessionEffect>) {
        if self.status != SessionStatus::AwaitingFullscreen {
            return;
        }

        tracing::warn!(
            exam_id = self.exam.exam_id(),
            error = %err,
            kind = err.kind_label(),
            "Fullscreen request failed"
        );
        let update = if err.is_recoverable() {
            UiUpdate::FullscreenPrompt { retry_message: Some(err.user_message()) }
        } else {
            UiUpdate::Blocking(err.user_message())
        };
        effects.push(SessionEffect::Present(update));
    }

    fn on_tick(&mut self, source: TickSource, effects: &mut Vec<SessionEffect>) {
        if self.status != SessionStatus::Active {
            return;
        }
        if self.timer.active_source() != Some(source) {
            tracing::trace!(?source, "Stale tick ignored");
            return;
        }

        let signal = self.timer.tick(source);
        effects.push(self.clock_update());
        match signal {
            Some(TimerSignal::LowTimeWarning) => {
                tracing::info!(exam_id = self.exam.exam_id(), "Low time warning");
                effects
                    .push(SessionEffect::Present(UiUpdate::LowTimeWarning(LOW_TIME_NOTICE.to_string())));
            }
            Some(TimerSignal::TimeExpired) => {
                self.enter_submit_pending(
                    SubmitTrigger::Auto(AutoSubmitReason::TimeExpired),
                    effects,
                );
            }
            None => {}
        }
    }

    fn on_grace_tick(&mut self, effects: &mut Vec<SessionEffect>) {
        let Some(grace) = self.grace.as_mut() else {
            return;
        };

        grace.seconds_left = grace.seconds_left.saturating_sub(1);
        let grace = *grace;
        if let SubmitTrigger::Auto(reason) = grace.trigger {
            effects.push(grace_update(reason, grace.seconds_left));
        }
        if grace.seconds_left == 0 {
            self.grace = None;
            effects.push(SessionEffect::DisarmGrace);
            self.dispatch_submit(effects);
        }
    }

    fn on_resolved(
        &mut self,
        result: Result<SubmissionReceipt, ProctorError>,
        effects: &mut Vec<SessionEffect>,
    ) {
        if !self.submit_dispatched || self.outcome.is_some() {
            tracing::warn!("Submission outcome received without a submission in flight");
            return;
        }

        match &result {
            Ok(receipt) => {
                effects.push(SessionEffect::Present(UiUpdate::SubmissionConfirmed(
                    receipt.message.clone(),
                )));
                effects.push(SessionEffect::Present(UiUpdate::Navigate(receipt.route)));
            }
            Err(err) => {
                let relogin = matches!(err, ProctorError::AuthenticationFailure);
                effects.push(SessionEffect::Present(UiUpdate::SubmissionFailed {
                    message: err.user_message(),
                    relogin,
                }));
                if relogin {
                    effects.push(SessionEffect::Present(UiUpdate::Navigate(Route::Login)));
                }
            }
        }

        self.outcome = Some(result);
        self.terminate(effects);
    }

    fn on_teardown(&mut self, effects: &mut Vec<SessionEffect>) {
        self.teardown_requested = true;

        match self.status {
            SessionStatus::AwaitingFullscreen | SessionStatus::Active => {
                tracing::warn!(
                    exam_id = self.exam.exam_id(),
                    remaining_seconds = self.timer.remaining_seconds(),
                    "Session torn down before submission; attempt forfeited"
                );
                self.trigger = None;
                self.monitor.seal();
                self.timer.stop();
                self.terminate(effects);
            }
            SessionStatus::AutoSubmitPending | SessionStatus::ManualSubmitPending => {
                if self.grace.take().is_some() {
                    effects.push(SessionEffect::DisarmGrace);
                }
                self.dispatch_submit(effects);
            }
            SessionStatus::Terminated | SessionStatus::ViewOnly => {}
        }
    }

    /// One-shot latch: the first trigger wins, later ones are no-ops.
    fn enter_submit_pending(&mut self, trigger: SubmitTrigger, effects: &mut Vec<SessionEffect>) {
        if self.trigger.is_some() {
            tracing::debug!(?trigger, "Submission already latched");
            return;
        }

        self.trigger = Some(trigger);
        self.monitor.seal();
        self.timer.stop();
        effects.push(SessionEffect::DisarmTicker);
        self.set_status(trigger.pending_status(), effects);

        if let SubmitTrigger::Auto(reason) = trigger {
            tracing::warn!(
                exam_id = self.exam.exam_id(),
                reason = reason.as_str(),
                tab_switches = self.monitor.log().tab_switches(),
                remaining_seconds = self.timer.remaining_seconds(),
                "Automatic submission triggered"
            );
        }

        let seconds = trigger.grace_seconds();
        if seconds == 0 {
            self.dispatch_submit(effects);
            return;
        }

        self.grace = Some(GraceCountdown { trigger, seconds_left: seconds });
        if let SubmitTrigger::Auto(reason) = trigger {
            effects.push(grace_update(reason, seconds));
        }
        effects.push(SessionEffect::ArmGrace);
    }

    fn dispatch_submit(&mut self, effects: &mut Vec<SessionEffect>) {
        if self.submit_dispatched {
            return;
        }
        let Some(trigger) = self.trigger else {
            return;
        };
        self.submit_dispatched = true;
        effects.push(SessionEffect::Submit { auto: trigger.is_auto() });
    }

    fn terminate(&mut self, effects: &mut Vec<SessionEffect>) {
        effects.push(SessionEffect::RevokeSubscriptions);
        effects.push(SessionEffect::DisarmTicker);
        if self.grace.take().is_some() {
            effects.push(SessionEffect::DisarmGrace);
        }
        for id in self.monitor.dismiss_all() {
            effects.push(SessionEffect::Present(UiUpdate::NoticeDismissed(id)));
        }
        effects.push(SessionEffect::ReleaseFullscreen);
        self.set_status(SessionStatus::Terminated, effects);
    }

    fn set_status(&mut self, next: SessionStatus, effects: &mut Vec<SessionEffect>) {
        if self.status == next {
            return;
        }
        tracing::info!(
            exam_id = self.exam.exam_id(),
            attempt_id = %self.exam.attempt_id(),
            from = self.status.as_str(),
            to = next.as_str(),
            "Session status changed"
        );
        metrics::counter!(crate::core::metrics::STATE_TRANSITIONS_TOTAL, "to" => next.as_str()).increment(1);
        self.status = next;
        effects.push(SessionEffect::Present(UiUpdate::StatusChanged(next)));
    }

    fn clock_update(&self) -> SessionEffect {
        let remaining_seconds = self.timer.remaining_seconds();
        SessionEffect::Present(UiUpdate::Clock {
            remaining_seconds,
            low_time: remaining_seconds <= LOW_TIME_THRESHOLD,
        })
    }

    pub(crate) fn teardown_requested(&self) -> bool {
        self.teardown_requested
    }
}

fn present_recorded(recorded: Recorded, effects: &mut Vec<SessionEffect>) {
    if let Some(replaced) = recorded.notice.replaced {
        effects.push(SessionEffect::Present(UiUpdate::NoticeDismissed(replaced)));
    }
    effects.push(SessionEffect::Present(UiUpdate::NoticeShown(recorded.notice.shown)));
}

fn grace_update(reason: AutoSubmitReason, seconds_left: u32) -> SessionEffect {
    SessionEffect::Present(UiUpdate::GraceCountdown {
        title: reason.title().to_string(),
        message: reason.message().to_string(),
        seconds_left,
    })
}

//! Capability boundary between the proctoring state machine and the host
//! environment (fullscreen control, page visibility, input interception).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::ProctorError;

/// Default actions the adapter swallows and reports instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptedInput {
    Copy,
    Paste,
    Cut,
    ContextMenu,
    KeyCombo(char),
}

/// A key press with its modifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub key: char,
    pub ctrl: bool,
    pub meta: bool,
}

impl KeyChord {
    pub fn ctrl(key: char) -> Self {
        Self { key, ctrl: true, meta: false }
    }

    pub fn cmd(key: char) -> Self {
        Self { key, ctrl: false, meta: true }
    }

    pub fn plain(key: char) -> Self {
        Self { key, ctrl: false, meta: false }
    }

    /// Ctrl/Cmd + C, V, X or A. Everything else passes through.
    pub fn intercepted(&self) -> Option<InterceptedInput> {
        if !(self.ctrl || self.meta) {
            return None;
        }
        let key = self.key.to_ascii_lowercase();
        matches!(key, 'c' | 'v' | 'x' | 'a').then_some(InterceptedInput::KeyCombo(key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvEvent {
    VisibilityChanged { hidden: bool },
    FullscreenChanged { active: bool },
    Input(InterceptedInput),
}

/// All three event streams behind one handle. Revoking (or dropping) the
/// handle detaches every listener at once; no event is yielded afterwards,
/// even one that was already queued.
pub struct EnvSubscription {
    events: mpsc::UnboundedReceiver<EnvEvent>,
    revoker: Option<Box<dyn FnOnce() + Send>>,
}

impl EnvSubscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<EnvEvent>,
        revoke: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self { events, revoker: Some(Box::new(revoke)) }
    }

    pub async fn recv(&mut self) -> Option<EnvEvent> {
        if self.is_revoked() {
            return None;
        }
        self.events.recv().await
    }

    pub fn revoke(&mut self) {
        if let Some(revoke) = self.revoker.take() {
            revoke();
            self.events.close();
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoker.is_none()
    }
}

impl Drop for EnvSubscription {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl std::fmt::Debug for EnvSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSubscription").field("revoked", &self.is_revoked()).finish()
    }
}

#[async_trait]
pub trait EnvironmentAdapter: Send + Sync {
    /// Asynchronous and fallible; a refusal is an error value, never a panic.
    async fn enter_fullscreen(&self) -> Result<(), ProctorError>;

    fn exit_fullscreen(&self);

    fn is_fullscreen(&self) -> bool;

    fn subscribe(&self) -> EnvSubscription;
}

/// In-memory environment. Tests script it directly; the console harness
/// drives it from stdin.
#[derive(Debug, Clone)]
pub struct SimulatedEnvironment {
    inner: Arc<Mutex<SimulatedState>>,
}

#[derive(Debug)]
struct SimulatedState {
    fullscreen: bool,
    supports_fullscreen: bool,
    deny_next_fullscreen: Option<String>,
    hidden: bool,
    next_subscriber_id: u64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<EnvEvent>)>,
    suppressed_defaults: u64,
}

impl Default for SimulatedEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEnvironment {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimulatedState {
                fullscreen: false,
                supports_fullscreen: true,
                deny_next_fullscreen: None,
                hidden: false,
                next_subscriber_id: 0,
                subscribers: Vec::new(),
                suppressed_defaults: 0,
            })),
        }
    }

    /// A host with no fullscreen API at all.
    pub fn without_fullscreen_support() -> Self {
        let env = Self::new();
        env.state().supports_fullscreen = false;
        env
    }

    /// Makes the next fullscreen request fail, e.g. for a missing user gesture.
    pub fn deny_next_fullscreen(&self, reason: impl Into<String>) {
        self.state().deny_next_fullscreen = Some(reason.into());
    }

    pub fn hide_page(&self) {
        let mut state = self.state();
        if !state.hidden {
            state.hidden = true;
            state.broadcast(EnvEvent::VisibilityChanged { hidden: true });
        }
    }

    pub fn show_page(&self) {
        let mut state = self.state();
        if state.hidden {
            state.hidden = false;
            state.broadcast(EnvEvent::VisibilityChanged { hidden: false });
        }
    }

    /// The user leaving fullscreen on their own (Esc, F11, window manager).
    pub fn user_exit_fullscreen(&self) {
        let mut state = self.state();
        if state.fullscreen {
            state.fullscreen = false;
            state.broadcast(EnvEvent::FullscreenChanged { active: false });
        }
    }

    /// Clipboard and context-menu actions. Returns whether the default was
    /// suppressed, which is always the case while someone is listening.
    pub fn trigger(&self, input: InterceptedInput) -> bool {
        let mut state = self.state();
        if state.subscribers.is_empty() {
            return false;
        }
        state.suppressed_defaults += 1;
        state.broadcast(EnvEvent::Input(input));
        true
    }

    pub fn press(&self, chord: KeyChord) -> bool {
        match chord.intercepted() {
            Some(input) => self.trigger(input),
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn suppressed_defaults(&self) -> u64 {
        self.state().suppressed_defaults
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SimulatedState {
    fn broadcast(&mut self, event: EnvEvent) {
        self.subscribers.retain(|(_, tx)| tx.send(event).is_ok());
    }
}

#[async_trait]
impl EnvironmentAdapter for SimulatedEnvironment {
    async fn enter_fullscreen(&self) -> Result<(), ProctorError> {
        let mut state = self.state();
        if !state.supports_fullscreen {
            return Err(ProctorError::EnvironmentUnsupportedCapability("the fullscreen API"));
        }
        if let Some(reason) = state.deny_next_fullscreen.take() {
            return Err(ProctorError::FullscreenDenied(reason));
        }
        if !state.fullscreen {
            state.fullscreen = true;
            state.broadcast(EnvEvent::FullscreenChanged { active: true });
        }
        Ok(())
    }

    fn exit_fullscreen(&self) {
        let mut state = self.state();
        if state.fullscreen {
            state.fullscreen = false;
            state.broadcast(EnvEvent::FullscreenChanged { active: false });
        }
    }

    fn is_fullscreen(&self) -> bool {
        self.state().fullscreen
    }

    fn subscribe(&self) -> EnvSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state();
            let id = state.next_subscriber_id;
            state.next_subscriber_id += 1;
            state.subscribers.push((id, tx));
            id
        };

        let weak: Weak<Mutex<SimulatedState>> = Arc::downgrade(&self.inner);
        EnvSubscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                let mut state = inner.lock().unwrap_or_else(PoisonError::into_inner);
                state.subscribers.retain(|(subscriber, _)| *subscriber != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_clipboard_and_select_all_chords_are_intercepted() {
        assert_eq!(KeyChord::ctrl('c').intercepted(), Some(InterceptedInput::KeyCombo('c')));
        assert_eq!(KeyChord::cmd('V').intercepted(), Some(InterceptedInput::KeyCombo('v')));
        assert_eq!(KeyChord::ctrl('a').intercepted(), Some(InterceptedInput::KeyCombo('a')));
        assert_eq!(KeyChord::ctrl('x').intercepted(), Some(InterceptedInput::KeyCombo('x')));
        assert_eq!(KeyChord::ctrl('s').intercepted(), None);
        assert_eq!(KeyChord::plain('c').intercepted(), None);
    }

    #[tokio::test]
    async fn subscription_receives_all_three_streams() {
        let env = SimulatedEnvironment::new();
        let mut sub = env.subscribe();

        env.hide_page();
        env.enter_fullscreen().await.expect("fullscreen");
        assert!(env.trigger(InterceptedInput::Paste));

        assert_eq!(sub.recv().await, Some(EnvEvent::VisibilityChanged { hidden: true }));
        assert_eq!(sub.recv().await, Some(EnvEvent::FullscreenChanged { active: true }));
        assert_eq!(sub.recv().await, Some(EnvEvent::Input(InterceptedInput::Paste)));
        assert_eq!(env.suppressed_defaults(), 1);
    }

    #[tokio::test]
    async fn revoke_detaches_every_listener_and_drops_queued_events() {
        let env = SimulatedEnvironment::new();
        let mut sub = env.subscribe();
        env.hide_page();
        assert_eq!(env.subscriber_count(), 1);

        sub.revoke();
        sub.revoke();

        assert_eq!(env.subscriber_count(), 0);
        assert!(sub.is_revoked());
        assert_eq!(sub.recv().await, None);
        assert!(!env.trigger(InterceptedInput::Copy));
    }

    #[test]
    fn dropping_subscription_revokes_it() {
        let env = SimulatedEnvironment::new();
        {
            let _sub = env.subscribe();
            assert_eq!(env.subscriber_count(), 1);
        }
        assert_eq!(env.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn fullscreen_failures_are_values() {
        let unsupported = SimulatedEnvironment::without_fullscreen_support();
        assert!(matches!(
            unsupported.enter_fullscreen().await,
            Err(ProctorError::EnvironmentUnsupportedCapability(_))
        ));

        let env = SimulatedEnvironment::new();
        env.deny_next_fullscreen("user gesture required");
        assert_eq!(
            env.enter_fullscreen().await,
            Err(ProctorError::FullscreenDenied("user gesture required".to_string()))
        );
        assert!(!env.is_fullscreen());
        env.enter_fullscreen().await.expect("second attempt");
        assert!(env.is_fullscreen());
    }
}

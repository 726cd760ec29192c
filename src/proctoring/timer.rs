//! Authoritative exam countdown.
//!
//! `remaining_seconds` is the single source of truth. It only moves when a
//! tick from the currently installed [`TickSource`] arrives, so pausing and
//! resuming never adds time back.

/// Remaining time at which the low-time warning fires.
pub const LOW_TIME_THRESHOLD: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    pub remaining_seconds: u32,
    pub running: bool,
}

/// Identifies one installed per-second tick source. Ticks carrying an older
/// source are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickSource(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    LowTimeWarning,
    TimeExpired,
}

#[derive(Debug)]
pub struct TimerEngine {
    state: TimerState,
    source: Option<TickSource>,
    generation: u64,
    low_time_armed: bool,
    expired: bool,
}

impl TimerEngine {
    pub fn initialize(total_seconds: u32) -> Self {
        Self {
            state: TimerState { remaining_seconds: total_seconds, running: false },
            source: None,
            generation: 0,
            low_time_armed: total_seconds > LOW_TIME_THRESHOLD,
            expired: false,
        }
    }

    /// Installs a fresh tick source, cancelling any existing one first.
    /// Returns `None` when there is no time left.
    pub fn start(&mut self) -> Option<TickSource> {
        if self.state.remaining_seconds == 0 {
            return None;
        }
        if let Some(previous) = self.source.take() {
            tracing::debug!(source = previous.0, "Replacing running tick source");
        }
        self.generation += 1;
        let source = TickSource(self.generation);
        self.source = Some(source);
        self.state.running = true;
        Some(source)
    }

    pub fn stop(&mut self) {
        self.source = None;
        self.state.running = false;
    }

    pub fn tick(&mut self, source: TickSource) -> Option<TimerSignal> {
        if self.source != Some(source) {
            return None;
        }

        self.state.remaining_seconds = self.state.remaining_seconds.saturating_sub(1);
        let remaining = self.state.remaining_seconds;

        if remaining > LOW_TIME_THRESHOLD {
            self.low_time_armed = true;
            return None;
        }

        if remaining == 0 {
            self.stop();
            if self.expired {
                return None;
            }
            self.expired = true;
            return Some(TimerSignal::TimeExpired);
        }

        if remaining == LOW_TIME_THRESHOLD && self.low_time_armed {
            self.low_time_armed = false;
            return Some(TimerSignal::LowTimeWarning);
        }

        None
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.state.remaining_seconds
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn active_source(&self) -> Option<TickSource> {
        self.source
    }

    #[cfg(test)]
    pub(crate) fn force_remaining(&mut self, seconds: u32) {
        self.state.remaining_seconds = seconds;
        if seconds > LOW_TIME_THRESHOLD {
            self.low_time_armed = true;
        }
    }
}

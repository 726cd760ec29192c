use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Duration, Instant, Interval};

use crate::core::errors::ProctorError;
use crate::core::time::now_utc;
use crate::proctoring::timer::TickSource;
use crate::proctoring::violations::{NoticeId, ViolationKind, ViolationLog};
use crate::proctoring::{
    EnvEvent, EnvSubscription, EnvironmentAdapter, ProctoringSession, Role, SessionEffect,
    SessionInput, SessionStatus, SubmissionReceipt, UiUpdate,
};
use crate::services::exam_backend::ExamBackend;
use crate::services::submission::{SubmissionCoordinator, SubmitMode};

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Requests coming from the person taking the exam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UserCommand {
    EnterFullscreen,
    SelectAnswer { index: usize, option: String },
    Status,
    Submit,
    Quit,
}

#[derive(Debug)]
pub(crate) struct SessionReport {
    pub(crate) status: SessionStatus,
    pub(crate) outcome: Option<Result<SubmissionReceipt, ProctorError>>,
    pub(crate) violations: ViolationLog,
    pub(crate) answered: usize,
    pub(crate) remaining_seconds: u32,
    pub(crate) torn_down: bool,
    /// Tickers and notice deadlines still armed when the runner returned.
    pub(crate) armed_timers: usize,
}

impl SessionReport {
    /// Torn down before anything was submitted.
    pub(crate) fn forfeited(&self) -> bool {
        self.torn_down && self.outcome.is_none()
    }
}

struct Ticker {
    source: TickSource,
    interval: Interval,
    /// Start of the period in progress.
    period_start: Instant,
}

impl Ticker {
    fn new(source: TickSource, period_start: Instant) -> Self {
        Self {
            source,
            interval: interval_at(period_start + TICK_PERIOD, TICK_PERIOD),
            period_start,
        }
    }
}

enum Wake {
    Environment(EnvEvent),
    Tick(TickSource),
    Grace,
    NoticeExpired(ViolationKind, NoticeId),
    Resolved(Result<SubmissionReceipt, ProctorError>),
    Command(Option<UserCommand>),
    Shutdown(bool),
    ShutdownClosed,
}

/// Executes session effects: owns the tickers, the notice deadlines, the
/// subscription and the in-flight submission task.
struct Effects<B> {
    env: Arc<dyn EnvironmentAdapter>,
    coordinator: Arc<SubmissionCoordinator<B>>,
    ui: mpsc::UnboundedSender<UiUpdate>,
    subscription: Option<EnvSubscription>,
    ticker: Option<Ticker>,
    /// Part of a tick period already used when the ticker was last disarmed.
    /// The next ticker resumes mid-period instead of granting a fresh second.
    carried: Duration,
    grace: Option<Interval>,
    notices: HashMap<NoticeId, (ViolationKind, Instant)>,
    outcome_tx: mpsc::Sender<Result<SubmissionReceipt, ProctorError>>,
}

/// Drives one proctored attempt until it terminates (or, for an author
/// preview, until the user quits). All inputs are serialized through a
/// single loop, so the session sees ticks and events strictly in order.
pub(crate) async fn run_session<B>(
    env: Arc<dyn EnvironmentAdapter>,
    coordinator: Arc<SubmissionCoordinator<B>>,
    mut session: ProctoringSession,
    mut commands: mpsc::Receiver<UserCommand>,
    ui: mpsc::UnboundedSender<UiUpdate>,
    mut shutdown: watch::Receiver<bool>,
) -> SessionReport
where
    B: ExamBackend + 'static,
{
    let (outcome_tx, mut outcome_rx) = mpsc::channel(1);
    let mut effects = Effects {
        env,
        coordinator,
        ui,
        subscription: None,
        ticker: None,
        carried: Duration::ZERO,
        grace: None,
        notices: HashMap::new(),
        outcome_tx,
    };

    effects.present(UiUpdate::StatusChanged(session.status()));
    if session.role() == Role::Student {
        effects.subscription = Some(effects.env.subscribe());
        effects.present(UiUpdate::FullscreenPrompt { retry_message: None });
    }

    let mut commands_open = true;
    let mut shutdown_open = true;
    let mut preview_closed = false;
    if *shutdown.borrow_and_update() {
        preview_closed = session.status() == SessionStatus::ViewOnly;
        effects.step(&mut session, SessionInput::Teardown);
    }

    while !preview_closed && session.status() != SessionStatus::Terminated {
        let wake = tokio::select! {
            Some(event) = next_event(&mut effects.subscription) => Wake::Environment(event),
            source = next_tick(&mut effects.ticker) => Wake::Tick(source),
            _ = next_grace(&mut effects.grace) => Wake::Grace,
            (kind, id) = next_notice_expiry(&effects.notices) => Wake::NoticeExpired(kind, id),
            Some(result) = outcome_rx.recv() => Wake::Resolved(result),
            command = commands.recv(), if commands_open => Wake::Command(command),
            changed = shutdown.changed(), if shutdown_open => match changed {
                Ok(()) => Wake::Shutdown(*shutdown.borrow_and_update()),
                Err(_) => Wake::ShutdownClosed,
            },
        };

        let input = match wake {
            Wake::Environment(event) => SessionInput::Environment(event),
            Wake::Tick(source) => SessionInput::Tick(source),
            Wake::Grace => SessionInput::GraceTick,
            Wake::NoticeExpired(kind, id) => {
                effects.notices.remove(&id);
                SessionInput::NoticeExpired { kind, id }
            }
            Wake::Resolved(result) => SessionInput::SubmissionResolved(result),
            Wake::Command(Some(command)) => {
                match effects.command(&mut session, command).await {
                    Some(input) => input,
                    None => continue,
                }
            }
            Wake::Command(None) => {
                tracing::info!("Command channel closed; tearing down session");
                commands_open = false;
                SessionInput::Teardown
            }
            Wake::Shutdown(true) => SessionInput::Teardown,
            Wake::Shutdown(false) => continue,
            Wake::ShutdownClosed => {
                shutdown_open = false;
                continue;
            }
        };

        if session.status() == SessionStatus::ViewOnly {
            preview_closed = input == SessionInput::Teardown;
            continue;
        }

        effects.step(&mut session, input);
    }

    effects.release();

    let report = SessionReport {
        status: session.status(),
        outcome: session.outcome().cloned(),
        violations: session.violations().clone(),
        answered: session.answers().answered(),
        remaining_seconds: session.timer().remaining_seconds(),
        torn_down: session.teardown_requested(),
        armed_timers: effects.armed_timers(),
    };
    tracing::info!(
        exam_id = session.exam().exam_id(),
        attempt_id = %session.exam().attempt_id(),
        status = report.status.as_str(),
        violations = report.violations.total(),
        answered = report.answered,
        remaining_seconds = report.remaining_seconds,
        forfeited = report.forfeited(),
        armed_timers = report.armed_timers,
        "Session runner finished"
    );
    report
}

impl<B> Effects<B>
where
    B: ExamBackend + 'static,
{
    fn step(&mut self, session: &mut ProctoringSession, input: SessionInput) {
        for effect in session.handle(input) {
            self.apply(session, effect);
        }
    }

    async fn command(
        &mut self,
        session: &mut ProctoringSession,
        command: UserCommand,
    ) -> Option<SessionInput> {
        match command {
            UserCommand::EnterFullscreen => {
                if session.status() != SessionStatus::AwaitingFullscreen {
                    return None;
                }
                Some(match self.env.enter_fullscreen().await {
                    Ok(()) => SessionInput::FullscreenEntered,
                    Err(err) => SessionInput::FullscreenFailed(err),
                })
            }
            UserCommand::SelectAnswer { index, option } => {
                match session.select_answer(index, &option) {
                    Ok(()) => self.present(UiUpdate::AnswerRecorded { index, option }),
                    Err(err) => {
                        tracing::debug!(index, option = %option, error = %err, "Answer rejected");
                        self.present(UiUpdate::AnswerRejected(err.to_string()));
                    }
                }
                None
            }
            UserCommand::Status => {
                self.present(UiUpdate::Summary(session.snapshot()));
                None
            }
            UserCommand::Submit => Some(SessionInput::SubmitRequested),
            UserCommand::Quit => Some(SessionInput::Teardown),
        }
    }

    fn apply(&mut self, session: &ProctoringSession, effect: SessionEffect) {
        match effect {
            SessionEffect::ArmTicker(source) => {
                let now = Instant::now();
                let carried = std::mem::take(&mut self.carried);
                let period_start = now.checked_sub(carried).unwrap_or(now);
                self.ticker = Some(Ticker::new(source, period_start));
            }
            SessionEffect::DisarmTicker => {
                if let Some(ticker) = self.ticker.take() {
                    self.carried = Instant::now().saturating_duration_since(ticker.period_start);
                }
            }
            SessionEffect::ArmGrace => {
                self.grace = Some(interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD));
            }
            SessionEffect::DisarmGrace => self.grace = None,
            SessionEffect::Submit { auto } => self.spawn_submit(session, SubmitMode::from_auto(auto)),
            SessionEffect::ReleaseFullscreen => {
                if self.env.is_fullscreen() {
                    self.env.exit_fullscreen();
                }
            }
            SessionEffect::RevokeSubscriptions => {
                if let Some(mut subscription) = self.subscription.take() {
                    subscription.revoke();
                }
                self.notices.clear();
            }
            SessionEffect::Present(update) => {
                match &update {
                    UiUpdate::NoticeShown(notice) => {
                        self.notices
                            .insert(notice.id, (notice.kind, Instant::now() + notice.ttl));
                    }
                    UiUpdate::NoticeDismissed(id) => {
                        self.notices.remove(id);
                    }
                    _ => {}
                }
                self.present(update);
            }
        }
    }

    fn spawn_submit(&self, session: &ProctoringSession, mode: SubmitMode) {
        let coordinator = Arc::clone(&self.coordinator);
        let env = Arc::clone(&self.env);
        let exam = session.exam().clone();
        let answers = session.answers().clone();
        let log = session.violations().clone();
        let outcome_tx = self.outcome_tx.clone();

        tokio::spawn(async move {
            let result =
                coordinator.submit(&exam, &answers, &log, mode, now_utc(), env.as_ref()).await;
            if outcome_tx.send(result).await.is_err() {
                tracing::warn!(
                    exam_id = exam.exam_id(),
                    "Submission outcome arrived after session ended"
                );
            }
        });
    }

    fn present(&self, update: UiUpdate) {
        if self.ui.send(update).is_err() {
            tracing::debug!("UI receiver dropped; update discarded");
        }
    }

    fn release(&mut self) {
        self.ticker = None;
        self.carried = Duration::ZERO;
        self.grace = None;
        self.notices.clear();
        if let Some(mut subscription) = self.subscription.take() {
            subscription.revoke();
        }
    }

    fn armed_timers(&self) -> usize {
        usize::from(self.ticker.is_some()) + usize::from(self.grace.is_some()) + self.notices.len()
    }
}

async fn next_event(subscription: &mut Option<EnvSubscription>) -> Option<EnvEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Ticker>) -> TickSource {
    match ticker {
        Some(ticker) => {
            ticker.period_start = ticker.interval.tick().await;
            ticker.source
        }
        None => std::future::pending().await,
    }
}

/// Resolves at the earliest notice deadline.
async fn next_notice_expiry(
    notices: &HashMap<NoticeId, (ViolationKind, Instant)>,
) -> (ViolationKind, NoticeId) {
    let earliest = notices.iter().min_by_key(|(id, (_, deadline))| (*deadline, **id));
    match earliest {
        Some((id, (kind, deadline))) => {
            let (id, kind, deadline) = (*id, *kind, *deadline);
            sleep_until(deadline).await;
            (kind, id)
        }
        None => std::future::pending().await,
    }
}

async fn next_grace(grace: &mut Option<Interval>) {
    match grace {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

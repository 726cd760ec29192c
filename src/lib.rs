pub mod core;
pub mod proctoring;
pub mod schemas;
pub mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::core::errors::ProctorError;
use crate::core::{config::Settings, telemetry};
use crate::proctoring::{ProctoringSession, Route, SimulatedEnvironment};
use crate::services::exam_backend::{ExamBackend, HttpExamBackend};
use crate::services::submission::SubmissionCoordinator;
use crate::tasks::{console, session_runner};

const REJECTED_REDIRECT_DELAY: Duration = Duration::from_secs(3);
const COMMAND_BUFFER: usize = 32;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let backend = HttpExamBackend::from_settings(&settings)?;
    let exam_id = settings.exam().exam_id.clone();
    let role = settings.exam().role;

    tracing::info!(
        exam_id,
        backend = backend.base_url(),
        role = ?role,
        environment = settings.runtime().environment.as_str(),
        "Loading exam"
    );

    let payload = match backend.fetch_exam(&exam_id).await {
        Ok(payload) => payload,
        Err(err) => return exam_unavailable(err).await,
    };
    let exam = payload
        .into_session(&exam_id, core::time::now_utc())
        .with_context(|| format!("Exam {exam_id} cannot be proctored"))?;

    let session = ProctoringSession::new(exam, role);
    console::print_exam(session.exam(), &session.snapshot());

    let env = SimulatedEnvironment::new();
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let shutdown = core::shutdown::teardown_on_signal();

    let input =
        tokio::spawn(console::drive_input(console::spawn_stdin_reader(), env.clone(), commands_tx));
    let renderer = tokio::spawn(console::render(ui_rx));

    let report = session_runner::run_session(
        Arc::new(env),
        Arc::new(SubmissionCoordinator::new(backend)),
        session,
        commands_rx,
        ui_tx,
        shutdown,
    )
    .await;

    input.abort();
    if let Err(err) = renderer.await {
        tracing::error!(error = %err, "Console renderer join failed");
    }

    if let Some(rendered) = core::metrics::render() {
        tracing::info!(metrics = %rendered, "Final metrics snapshot");
    }

    if report.forfeited() {
        tracing::warn!(
            violations = report.violations.total(),
            remaining_seconds = report.remaining_seconds,
            "Exam closed without submission"
        );
    }
    if let Some(Err(err)) = report.outcome {
        return Err(anyhow::Error::new(err).context("Exam submission failed"));
    }

    Ok(())
}

async fn exam_unavailable(err: ProctorError) -> anyhow::Result<()> {
    println!("{}", err.user_message());
    if matches!(err, ProctorError::ExamRejected(_)) {
        tokio::time::sleep(REJECTED_REDIRECT_DELAY).await;
        println!("-> {}", console::route_path(Route::Results));
        return Ok(());
    }
    if err == ProctorError::AuthenticationFailure {
        println!("-> {}", console::route_path(Route::Login));
    }

    Err(anyhow::Error::new(err).context("Failed to load exam"))
}

use std::time::Instant;

use time::OffsetDateTime;

use crate::core::errors::ProctorError;
use crate::core::metrics::{SUBMISSIONS_TOTAL, SUBMISSION_LATENCY_SECONDS};
use crate::core::time::elapsed_seconds;
use crate::proctoring::violations::ViolationLog;
use crate::proctoring::{
    AnswerSet, EnvironmentAdapter, ExamSession, Route, SubmissionReceipt,
};
use crate::schemas::submission::SubmissionRecord;
use crate::services::exam_backend::ExamBackend;

pub const AUTO_SUBMITTED_MESSAGE: &str = "Your exam has been submitted automatically.";
pub const MANUAL_SUBMITTED_MESSAGE: &str = "Exam submitted successfully!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    Manual,
    Auto,
}

impl SubmitMode {
    pub fn from_auto(auto: bool) -> Self {
        if auto {
            Self::Auto
        } else {
            Self::Manual
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }

    fn success_message(self) -> &'static str {
        match self {
            Self::Manual => MANUAL_SUBMITTED_MESSAGE,
            Self::Auto => AUTO_SUBMITTED_MESSAGE,
        }
    }
}

/// Sends the single submission of an attempt and finalizes the local side.
#[derive(Debug)]
pub struct SubmissionCoordinator<B> {
    backend: B,
}

impl<B: ExamBackend> SubmissionCoordinator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn build_record(
        exam: &ExamSession,
        answers: &AnswerSet,
        log: &ViolationLog,
        mode: SubmitMode,
        submitted_at: OffsetDateTime,
    ) -> SubmissionRecord {
        SubmissionRecord {
            exam_id: exam.exam_id().to_string(),
            answers: answers.to_wire(),
            auto_submitted: mode == SubmitMode::Auto,
            tab_switches: log.tab_switches(),
            duration: elapsed_seconds(exam.started_at(), submitted_at),
        }
    }

    pub async fn submit(
        &self,
        exam: &ExamSession,
        answers: &AnswerSet,
        log: &ViolationLog,
        mode: SubmitMode,
        submitted_at: OffsetDateTime,
        env: &dyn EnvironmentAdapter,
    ) -> Result<SubmissionReceipt, ProctorError> {
        let record = Self::build_record(exam, answers, log, mode, submitted_at);
        let started = Instant::now();
        let result = self.backend.submit(&record).await;
        metrics::histogram!(SUBMISSION_LATENCY_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::counter!(
                    SUBMISSIONS_TOTAL,
                    "mode" => mode.as_str(),
                    "status" => "accepted"
                )
                .increment(1);
                tracing::info!(
                    exam_id = exam.exam_id(),
                    attempt_id = %exam.attempt_id(),
                    mode = mode.as_str(),
                    answered = answers.answered(),
                    tab_switches = record.tab_switches,
                    duration = record.duration,
                    "Exam submitted"
                );

                if env.is_fullscreen() {
                    env.exit_fullscreen();
                }

                Ok(SubmissionReceipt {
                    auto: mode == SubmitMode::Auto,
                    message: mode.success_message().to_string(),
                    route: Route::Results,
                })
            }
            Err(err) => {
                metrics::counter!(
                    SUBMISSIONS_TOTAL,
                    "mode" => mode.as_str(),
                    "status" => err.kind_label()
                )
                .increment(1);
                tracing::error!(
                    exam_id = exam.exam_id(),
                    attempt_id = %exam.attempt_id(),
                    mode = mode.as_str(),
                    error = %err,
                    "Exam submission failed"
                );
                Err(err)
            }
        }
    }
}

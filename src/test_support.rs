use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::errors::ProctorError;
use crate::core::time::now_utc;
use crate::proctoring::{ExamSession, Question};
use crate::schemas::exam::{ExamPayload, QuestionPayload};
use crate::schemas::submission::SubmissionRecord;
use crate::services::exam_backend::ExamBackend;

const OPTIONS: [&str; 4] = ["A", "B", "C", "D"];

/// Serializes tests that mutate process environment variables.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn sample_questions(count: usize) -> Vec<Question> {
    (1..=count)
        .map(|n| Question {
            prompt: format!("Question {n}"),
            options: OPTIONS.iter().map(|option| option.to_string()).collect(),
        })
        .collect()
}

pub(crate) fn sample_exam(questions: usize, time_limit_seconds: u32) -> ExamSession {
    ExamSession::new("exam-1", "Sample exam", sample_questions(questions), time_limit_seconds, now_utc())
}

pub(crate) fn sample_payload(questions: usize, time_limit_minutes: u32) -> ExamPayload {
    ExamPayload {
        title: "Sample exam".to_string(),
        time_limit: time_limit_minutes,
        questions: sample_questions(questions)
            .into_iter()
            .map(|question| QuestionPayload { question: question.prompt, options: question.options })
            .collect(),
    }
}

/// In-memory backend that records every submission it receives.
#[derive(Debug)]
pub(crate) struct RecordingBackend {
    submit_result: Result<(), ProctorError>,
    submit_delay: Option<Duration>,
    submissions: Mutex<Vec<SubmissionRecord>>,
}

impl RecordingBackend {
    pub(crate) fn accepting() -> Self {
        Self {
            submit_result: Ok(()),
            submit_delay: None,
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(err: ProctorError) -> Self {
        Self { submit_result: Err(err), ..Self::accepting() }
    }

    pub(crate) fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub(crate) fn submissions(&self) -> Vec<SubmissionRecord> {
        self.submissions.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait]
impl ExamBackend for RecordingBackend {
    async fn fetch_exam(&self, _exam_id: &str) -> Result<ExamPayload, ProctorError> {
        Ok(sample_payload(3, 10))
    }

    async fn submit(&self, record: &SubmissionRecord) -> Result<(), ProctorError> {
        self.submissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        self.submit_result.clone()
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Wire marker for a question the student left unanswered.
pub const NO_ANSWER: &str = "";

/// Who opened the exam screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Author,
}

/// Where the screen goes once the session is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Results,
    Login,
}

/// Successful submission as reported back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub auto: bool,
    pub message: String,
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
}

/// An exam attempt as seen by the client. Owned by one `ProctoringSession`.
#[derive(Debug, Clone)]
pub struct ExamSession {
    exam_id: String,
    attempt_id: Uuid,
    title: String,
    questions: Vec<Question>,
    time_limit_seconds: u32,
    started_at: OffsetDateTime,
}

impl ExamSession {
    pub fn new(
        exam_id: impl Into<String>,
        title: impl Into<String>,
        questions: Vec<Question>,
        time_limit_seconds: u32,
        started_at: OffsetDateTime,
    ) -> Self {
        Self {
            exam_id: exam_id.into(),
            attempt_id: Uuid::new_v4(),
            title: title.into(),
            questions,
            time_limit_seconds,
            started_at,
        }
    }

    pub fn exam_id(&self) -> &str {
        &self.exam_id
    }

    /// Client-side correlation id for logs; not sent to the backend.
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_seconds
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("question index {index} is out of range (exam has {len} questions)")]
    OutOfRange { index: usize, len: usize },
    #[error("'{option}' is not an option of question {index}")]
    UnknownOption { index: usize, option: String },
    #[error("answers can only be changed while the exam is in progress")]
    SessionLocked,
}

/// Selected options, one slot per question. The length is fixed when the
/// session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSet {
    slots: Vec<Option<String>>,
}

impl AnswerSet {
    pub fn for_questions(questions: &[Question]) -> Self {
        Self { slots: vec![None; questions.len()] }
    }

    pub(crate) fn select(
        &mut self,
        questions: &[Question],
        index: usize,
        option: &str,
    ) -> Result<(), AnswerError> {
        let len = self.slots.len();
        let question =
            questions.get(index).ok_or(AnswerError::OutOfRange { index, len })?;
        if !question.options.iter().any(|candidate| candidate == option) {
            return Err(AnswerError::UnknownOption { index, option: option.to_string() });
        }
        let slot = self.slots.get_mut(index).ok_or(AnswerError::OutOfRange { index, len })?;
        *slot = Some(option.to_string());
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|slot| slot.as_deref())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn answered(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// One entry per question, unset slots replaced by [`NO_ANSWER`].
    pub fn to_wire(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| slot.clone().unwrap_or_else(|| NO_ANSWER.to_string()))
            .collect()
    }
}

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::{Validate, ValidationError};

use crate::core::errors::ProctorError;
use crate::proctoring::{ExamSession, Question};

/// `GET /exams/{id}` response body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExamPayload {
    #[serde(default)]
    pub title: String,
    /// Minutes, as stored by the exam authoring side.
    #[serde(rename = "timeLimit")]
    #[validate(range(min = 1, message = "timeLimit must be positive"))]
    pub time_limit: u32,
    #[validate(length(min = 1, message = "exam must contain at least one question"), nested)]
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuestionPayload {
    #[validate(length(min = 1, message = "question must not be empty"))]
    pub question: String,
    #[validate(
        length(min = 2, message = "question needs at least two options"),
        custom(function = "validate_options")
    )]
    pub options: Vec<String>,
}

fn validate_options(options: &Vec<String>) -> Result<(), ValidationError> {
    if options.iter().any(|option| option.trim().is_empty()) {
        return Err(ValidationError::new("empty_option")
            .with_message("options must not be blank".into()));
    }

    let mut seen = std::collections::HashSet::with_capacity(options.len());
    if !options.iter().all(|option| seen.insert(option.as_str())) {
        return Err(ValidationError::new("duplicate_option")
            .with_message("options must be distinct".into()));
    }

    Ok(())
}

impl ExamPayload {
    /// Validates the payload and turns it into a session snapshot that
    /// stays immutable for the rest of the attempt.
    pub fn into_session(
        self,
        exam_id: &str,
        started_at: OffsetDateTime,
    ) -> Result<ExamSession, ProctorError> {
        self.validate().map_err(|err| ProctorError::InvalidExam(err.to_string()))?;

        let time_limit_seconds = self
            .time_limit
            .checked_mul(60)
            .ok_or_else(|| ProctorError::InvalidExam("timeLimit is too large".to_string()))?;

        let questions = self
            .questions
            .into_iter()
            .map(|item| Question { prompt: item.question, options: item.options })
            .collect();

        Ok(ExamSession::new(exam_id, self.title, questions, time_limit_seconds, started_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> ExamPayload {
        serde_json::from_value(value).expect("payload")
    }

    #[test]
    fn converts_minutes_to_seconds() {
        let exam = payload(json!({
            "title": "Midterm",
            "timeLimit": 2,
            "questions": [
                {"question": "2 + 2?", "options": ["3", "4"]},
                {"question": "Capital of France?", "options": ["Paris", "Rome", "Oslo"]}
            ]
        }))
        .into_session("exam-1", crate::core::time::now_utc())
        .expect("valid exam");

        assert_eq!(exam.exam_id(), "exam-1");
        assert_eq!(exam.time_limit_seconds(), 120);
        assert_eq!(exam.questions().len(), 2);
        assert_eq!(exam.questions()[1].options[0], "Paris");
    }

    #[test]
    fn rejects_empty_question_list() {
        let err = payload(json!({"title": "Empty", "timeLimit": 5, "questions": []}))
            .into_session("exam-1", crate::core::time::now_utc())
            .unwrap_err();
        assert!(matches!(err, ProctorError::InvalidExam(_)));
    }

    #[test]
    fn rejects_zero_time_limit() {
        let err = payload(json!({
            "title": "No time",
            "timeLimit": 0,
            "questions": [{"question": "q", "options": ["a", "b"]}]
        }))
        .into_session("exam-1", crate::core::time::now_utc())
        .unwrap_err();
        assert!(matches!(err, ProctorError::InvalidExam(_)));
    }

    #[test]
    fn rejects_blank_or_duplicate_options() {
        for options in [json!(["a", ""]), json!(["a", "a"]), json!(["only"])] {
            let err = payload(json!({
                "title": "Bad options",
                "timeLimit": 5,
                "questions": [{"question": "q", "options": options}]
            }))
            .into_session("exam-1", crate::core::time::now_utc())
            .unwrap_err();
            assert!(matches!(err, ProctorError::InvalidExam(_)), "{options}");
        }
    }
}

use serde::{Deserialize, Serialize};

/// `POST /exams/submit` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub exam_id: String,
    /// One entry per question, `""` for unanswered.
    pub answers: Vec<String>,
    pub auto_submitted: bool,
    pub tab_switches: u32,
    /// Seconds since the exam was loaded.
    pub duration: u64,
}

/// Error body returned by the exam backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

use thiserror::Error;

pub const NETWORK_FAILURE_MESSAGE: &str = "Network error. Please try again.";
pub const AUTHENTICATION_FAILURE_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const FULLSCREEN_DENIED_MESSAGE: &str = "Failed to enter fullscreen mode. Please try again.";

/// Failures a proctored session can surface to the student.
///
/// Environment and timer problems never escape the session: they are
/// turned into transitions or notices. Backend failures are returned to
/// the caller and rendered as a persistent error state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProctorError {
    #[error("fullscreen request denied: {0}")]
    FullscreenDenied(String),
    #[error("environment does not support {0}")]
    EnvironmentUnsupportedCapability(&'static str),
    #[error("authentication failed")]
    AuthenticationFailure,
    #[error("validation failed: {0}")]
    ValidationFailure(String),
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("exam rejected: {0}")]
    ExamRejected(String),
    #[error("invalid exam payload: {0}")]
    InvalidExam(String),
}

impl ProctorError {
    /// Text shown to the student for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::FullscreenDenied(_) => FULLSCREEN_DENIED_MESSAGE.to_string(),
            Self::EnvironmentUnsupportedCapability(capability) => format!(
                "This exam requires {capability}, which your browser does not support. \
                 The exam cannot be started."
            ),
            Self::AuthenticationFailure => AUTHENTICATION_FAILURE_MESSAGE.to_string(),
            Self::ValidationFailure(message) => message.clone(),
            Self::NetworkFailure(_) => NETWORK_FAILURE_MESSAGE.to_string(),
            Self::ExamRejected(reason) => reason.clone(),
            Self::InvalidExam(_) => "Failed to load exam. Please try again later.".to_string(),
        }
    }

    /// Recoverable failures only need a re-prompt; the rest block the screen.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FullscreenDenied(_))
    }

    pub(crate) fn kind_label(&self) -> &'static str {
        match self {
            Self::FullscreenDenied(_) => "fullscreen_denied",
            Self::EnvironmentUnsupportedCapability(_) => "unsupported_capability",
            Self::AuthenticationFailure => "authentication",
            Self::ValidationFailure(_) => "validation",
            Self::NetworkFailure(_) => "network",
            Self::ExamRejected(_) => "rejected",
            Self::InvalidExam(_) => "invalid_exam",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_surfaced_verbatim() {
        let err = ProctorError::ValidationFailure("Exam window has closed".to_string());
        assert_eq!(err.user_message(), "Exam window has closed");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn network_failure_hides_transport_details() {
        let err = ProctorError::NetworkFailure("connection reset by peer".to_string());
        assert_eq!(err.user_message(), NETWORK_FAILURE_MESSAGE);
    }

    #[test]
    fn only_fullscreen_denial_is_recoverable() {
        assert!(ProctorError::FullscreenDenied("no gesture".to_string()).is_recoverable());
        assert!(!ProctorError::EnvironmentUnsupportedCapability("fullscreen").is_recoverable());
        assert!(!ProctorError::AuthenticationFailure.is_recoverable());
    }
}

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::core::config::{BearerToken, Settings};
use crate::core::errors::ProctorError;
use crate::schemas::exam::ExamPayload;
use crate::schemas::submission::{ErrorBody, SubmissionRecord};

const SUBMIT_FALLBACK_MESSAGE: &str = "Failed to submit exam";
const REJECTED_FALLBACK_MESSAGE: &str = "You are not allowed to take this exam";

/// Remote side of a proctored attempt: loads the exam, accepts the answers.
#[async_trait]
pub trait ExamBackend: Send + Sync {
    async fn fetch_exam(&self, exam_id: &str) -> Result<ExamPayload, ProctorError>;

    /// Sends one submission. Never retried by the caller.
    async fn submit(&self, record: &SubmissionRecord) -> Result<(), ProctorError>;
}

#[derive(Debug, Clone)]
pub struct HttpExamBackend {
    client: Client,
    base_url: String,
    token: BearerToken,
}

impl HttpExamBackend {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let backend = settings.backend();
        Self::build(
            backend.base_url.as_str(),
            backend.token.clone(),
            Duration::from_secs(backend.request_timeout_seconds),
            Duration::from_secs(backend.connect_timeout_seconds),
        )
    }

    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        Self::build(base_url, BearerToken::new(token), request_timeout, request_timeout)
    }

    fn build(
        base_url: &str,
        token: BearerToken,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .context("Failed to build exam backend HTTP client")?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), token })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(self.token.expose())
        }
    }
}

#[async_trait]
impl ExamBackend for HttpExamBackend {
    async fn fetch_exam(&self, exam_id: &str) -> Result<ExamPayload, ProctorError> {
        let endpoint = format!("{}/exams/{}", self.base_url, exam_id);
        let response = self
            .authorized(self.client.get(&endpoint))
            .send()
            .await
            .map_err(|err| ProctorError::NetworkFailure(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<ExamPayload>()
                .await
                .map_err(|err| ProctorError::InvalidExam(err.to_string()));
        }

        let message = error_message(response).await;
        tracing::warn!(exam_id, status = status.as_u16(), ?message, "Exam fetch rejected");
        Err(match status {
            StatusCode::UNAUTHORIZED => ProctorError::AuthenticationFailure,
            StatusCode::FORBIDDEN => ProctorError::ExamRejected(
                message.unwrap_or_else(|| REJECTED_FALLBACK_MESSAGE.to_string()),
            ),
            _ => ProctorError::NetworkFailure(format!(
                "exam fetch failed (status {status}): {}",
                message.unwrap_or_default()
            )),
        })
    }

    async fn submit(&self, record: &SubmissionRecord) -> Result<(), ProctorError> {
        let endpoint = format!("{}/exams/submit", self.base_url);
        let response = self
            .authorized(self.client.post(&endpoint))
            .json(record)
            .send()
            .await
            .map_err(|err| ProctorError::NetworkFailure(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProctorError::AuthenticationFailure);
        }

        match error_message(response).await {
            Some(message) => Err(ProctorError::ValidationFailure(message)),
            None if status.is_server_error() => {
                Err(ProctorError::NetworkFailure(format!("submit failed (status {status})")))
            }
            None => Err(ProctorError::ValidationFailure(SUBMIT_FALLBACK_MESSAGE.to_string())),
        }
    }
}

/// Server-provided `message`, if the body is JSON and carries one.
async fn error_message(response: Response) -> Option<String> {
    let raw_body = response.text().await.ok()?;
    serde_json::from_str::<ErrorBody>(&raw_body)
        .ok()
        .and_then(|body| body.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
}

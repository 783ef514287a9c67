//! Seams for the two remote generation services.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::prompts::Prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Auth,
    Quota,
    Policy,
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Transport => "transport",
            FailureKind::Auth => "auth",
            FailureKind::Quota => "quota",
            FailureKind::Policy => "policy",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: FailureKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// The URL is dropped from the message; it may carry credentials.
    pub fn transport(err: reqwest::Error) -> Self {
        Self::new(FailureKind::Transport, err.without_url().to_string())
    }

    /// Builds an error from a non-success HTTP response.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        Self::new(classify(Some(status), body), format!("status={} body={}", status, body))
    }
}

/// Sorts a failed call into auth/quota/policy so users get pointed at the
/// right fix. `None` status means the request never got an answer.
pub fn classify(status: Option<StatusCode>, body: &str) -> FailureKind {
    let Some(status) = status else { return FailureKind::Transport };
    let body = body.to_lowercase();

    let auth_markers = ["api key not valid", "api key is invalid", "invalid api key", "incorrect api key", "invalid_api_key"];
    let quota_markers = ["quota", "billing", "rate limit", "resource_exhausted"];
    let policy_markers = ["safety system", "content policy", "content_policy", "moderation", "blocked", "safety"];

    if status == StatusCode::UNAUTHORIZED || auth_markers.iter().any(|m| body.contains(m)) {
        FailureKind::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS || quota_markers.iter().any(|m| body.contains(m)) {
        FailureKind::Quota
    } else if policy_markers.iter().any(|m| body.contains(m)) {
        FailureKind::Policy
    } else if status == StatusCode::FORBIDDEN {
        FailureKind::Auth
    } else {
        FailureKind::Other
    }
}

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub model: String,
    pub prompt: Prompt,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub count: u32,
}

/// One entry of an image-generation response. Pixel data may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedImage {
    pub b64_data: Option<String>,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the raw text of the model's answer.
    async fn generate(&self, api_key: &str, request: TextRequest) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, api_key: &str, request: ImageRequest) -> Result<Vec<RenderedImage>, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_rejections() {
        assert_eq!(classify(None, ""), FailureKind::Transport);
        assert_eq!(classify(Some(StatusCode::UNAUTHORIZED), "{}"), FailureKind::Auth);
        assert_eq!(
            classify(Some(StatusCode::BAD_REQUEST), r#"{"error":{"message":"API key not valid. Please pass a valid API key."}}"#),
            FailureKind::Auth
        );
        assert_eq!(classify(Some(StatusCode::TOO_MANY_REQUESTS), ""), FailureKind::Quota);
        assert_eq!(
            classify(Some(StatusCode::BAD_REQUEST), "Billing hard limit has been reached"),
            FailureKind::Quota
        );
        assert_eq!(
            classify(Some(StatusCode::BAD_REQUEST), "Your request was rejected as a result of our safety system"),
            FailureKind::Policy
        );
        assert_eq!(classify(Some(StatusCode::FORBIDDEN), "permission denied"), FailureKind::Auth);
        assert_eq!(classify(Some(StatusCode::INTERNAL_SERVER_ERROR), "boom"), FailureKind::Other);
    }
}

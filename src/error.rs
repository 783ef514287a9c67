use serde::Serialize;
use thiserror::Error;

use crate::{media::MediaReadError, pipeline::Stage, remote::{FailureKind, ServiceError}};

/// The two remote services a run talks to. Kept apart so callers can point
/// at the right credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    TextGeneration,
    ImageGeneration,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::TextGeneration => f.write_str("Gemini text generation"),
            Service::ImageGeneration => f.write_str("OpenAI image generation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("media could not be read: {0}")]
    MediaRead(#[from] MediaReadError),
    #[error("{0} API key is not configured")]
    MissingCredential(Service),
    #[error("no product selected")]
    NoProductSelected,
    #[error("product {0} not found")]
    ProductNotFound(String),
    #[error("{0}")]
    MissingMedia(&'static str),
    #[error("{stage} returned text that is not valid JSON: {raw_text_preview}")]
    MalformedResponse { stage: Stage, raw_text_preview: String },
    #[error("{stage} returned JSON with missing or invalid field `{field}`{}", detail_suffix(.detail))]
    InvalidResponseShape { stage: Stage, field: String, detail: Option<String> },
    #[error("{service} failed ({kind}): {message}")]
    RemoteService { service: Service, kind: FailureKind, message: String },
    #[error("product catalog unavailable: {0}")]
    Repository(#[from] RepositoryError),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(" ({d})")).unwrap_or_default()
}

impl PipelineError {
    pub fn remote(service: Service, err: ServiceError) -> Self {
        PipelineError::RemoteService { service, kind: err.kind, message: err.message }
    }

    /// Stable machine-readable tag for API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MediaRead(_) => "media_read",
            PipelineError::MissingCredential(_) => "missing_credential",
            PipelineError::NoProductSelected => "no_product_selected",
            PipelineError::ProductNotFound(_) => "product_not_found",
            PipelineError::MissingMedia(_) => "missing_media",
            PipelineError::MalformedResponse { .. } => "malformed_response",
            PipelineError::InvalidResponseShape { .. } => "invalid_response_shape",
            PipelineError::RemoteService { .. } => "remote_service",
            PipelineError::Repository(_) => "repository",
        }
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("validation failed, missing: {}", .0.join(", "))]
    Validation(Vec<&'static str>),
    #[error("product {0} not found")]
    NotFound(String),
    #[error("product {0} already exists")]
    AlreadyExists(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("stored row could not be mapped: {0}")]
    Mapping(#[from] serde_json::Error),
}

impl RepositoryError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(err.without_url().to_string())
    }
}

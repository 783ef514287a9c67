use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::remote::{classify, FailureKind, ImageGenerator, ImageRequest, RenderedImage, ServiceError};

/// OpenAI Images client (`POST /images/generations`).
pub struct OpenAiImageClient {
    client: Client,
    base_url: String,
}

impl OpenAiImageClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// OpenAI reports the precise reason in `error.code`; fall back to the
/// generic status/body rules when it is absent or unfamiliar.
fn classify_openai(status: reqwest::StatusCode, body: &str) -> ServiceError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let kind = match envelope.as_ref().and_then(|e| e.error.code.as_deref()) {
        Some("invalid_api_key") => FailureKind::Auth,
        Some("billing_hard_limit_reached" | "insufficient_quota" | "rate_limit_exceeded") => FailureKind::Quota,
        Some("content_policy_violation" | "moderation_blocked") => FailureKind::Policy,
        _ => classify(Some(status), body),
    };
    let message = envelope
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("status={} body={}", status, body));
    ServiceError::new(kind, message)
}

#[async_trait]
impl ImageGenerator for OpenAiImageClient {
    async fn generate(&self, api_key: &str, request: ImageRequest) -> Result<Vec<RenderedImage>, ServiceError> {
        let url = format!("{}/images/generations", self.base_url);
        info!("🎨 Requesting {} image(s) from {} via {}", request.count, request.model, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&GenerationBody { model: &request.model, prompt: &request.prompt, n: request.count })
            .send()
            .await
            .map_err(ServiceError::transport)?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        let response_text = response.text().await.map_err(ServiceError::transport)?;

        if !status.is_success() {
            error!("❌ OpenAI API error response: {}", response_text);
            return Err(classify_openai(status, &response_text));
        }

        let parsed: ImagesResponse = serde_json::from_str(&response_text)
            .map_err(|e| ServiceError::new(FailureKind::Other, format!("parse error: {}", e)))?;
        Ok(parsed
            .data
            .into_iter()
            .map(|d| RenderedImage { b64_data: d.b64_json })
            .collect())
    }
}

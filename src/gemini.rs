use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    media::InlineMedia,
    prompts::{Prompt, PromptPart},
    remote::{FailureKind, ServiceError, TextGenerator, TextRequest},
};

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

/// Gemini `generateContent` client. The key travels per call because it is
/// owned by the settings layer, not by the client.
pub struct GeminiClient {
    client: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, api_key: &str, request: TextRequest) -> Result<String, ServiceError> {
        let url = self.endpoint(&request.model);
        info!("🔗 Making request to: {}", url);

        let body = GenerateContentRequest::from(&request.prompt);
        if let Ok(mut logged) = serde_json::to_value(&body) {
            truncate_base64_in_json(&mut logged);
            debug!("📤 Request body: {}", serde_json::to_string(&logged).unwrap_or_default());
        }

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(ServiceError::transport)?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        let response_text = response.text().await.map_err(ServiceError::transport)?;

        if !status.is_success() {
            error!("❌ Gemini API error response: {}", response_text);
            return Err(ServiceError::from_status(status, &response_text));
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| ServiceError::new(FailureKind::Other, format!("parse error: {}", e)))?;

        if let Some(reason) = parsed.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref()) {
            error!("❌ Prompt blocked by Gemini: {}", reason);
            return Err(ServiceError::new(FailureKind::Policy, format!("prompt blocked: {}", reason)));
        }

        let text = extract_text(&parsed).ok_or_else(|| {
            let finish = parsed
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "none".to_string());
            let kind = if finish == "SAFETY" { FailureKind::Policy } else { FailureKind::Other };
            ServiceError::new(kind, format!("no text content in response (finishReason={})", finish))
        })?;
        info!("✅ Gemini returned {} chars", text.len());
        Ok(text)
    }
}

// --- Request Building ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<RequestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineMedia,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

impl From<&Prompt> for GenerateContentRequest {
    fn from(prompt: &Prompt) -> Self {
        let parts = prompt
            .parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => RequestPart::Text { text: text.clone() },
                PromptPart::Media(media) => RequestPart::Inline { inline_data: media.clone() },
            })
            .collect();
        Self {
            contents: vec![RequestContent { parts }],
            system_instruction: prompt
                .system_instruction
                .as_ref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| RequestContent { parts: vec![RequestPart::Text { text: s.clone() }] }),
            generation_config: prompt
                .json_response
                .then_some(GenerationConfig { response_mime_type: "application/json" }),
        }
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Other(serde_json::Value),
}

/// Concatenates the text parts of the first candidate.
fn extract_text(resp: &GeminiResponse) -> Option<String> {
    let candidate = resp.candidates.first()?;
    let text: String = candidate
        .content
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            Part::Other(_) => None,
        })
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

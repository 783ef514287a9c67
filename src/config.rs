use std::path::PathBuf;

use tracing::info;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";
pub const DEFAULT_TABLE: &str = "workshops";
pub const DEFAULT_BUCKET: &str = "workshoppdfs";

/// Model identifiers used per stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub text_model: String,
    pub video_model: String,
    pub image_model: String,
    pub image_count: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            video_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            image_count: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub table: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub models: ModelConfig,
    pub supabase: Option<SupabaseConfig>,
    pub settings_path: PathBuf,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let text_model = var("GEMINI_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string());
        let models = ModelConfig {
            video_model: var("GEMINI_VIDEO_MODEL").unwrap_or_else(|| text_model.clone()),
            text_model,
            image_model: var("OPENAI_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            image_count: var("IMAGE_COUNT").and_then(|v| v.parse().ok()).filter(|n| *n > 0).unwrap_or(1),
        };

        let supabase = match (var("SUPABASE_URL"), var("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
                table: var("SUPABASE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
                bucket: var("SUPABASE_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            }),
            _ => None,
        };

        let config = Self {
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_api_base: var("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_api_base: var("OPENAI_API_BASE").unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
            models,
            supabase,
            settings_path: var("SETTINGS_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("ad_studio_settings.json")),
            port: var("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
        };
        info!(
            "⚙️ Models: text={} video={} image={} (x{})",
            config.models.text_model, config.models.video_model, config.models.image_model, config.models.image_count
        );
        config
    }
}

//! Credentials and user-editable system prompts.
//!
//! The text-service key is process configuration. The image-service key and
//! the system prompts are edited at runtime and persisted to a JSON file.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{error::{PipelineError, Service}, pipeline::Action};

pub const REFERENCE_SCRIPT_SYSTEM_PROMPT: &str = r#"You are an expert scriptwriter who adapts existing video content to promote a new product (a workshop or a piece of IP).
Keep the core narrative, style, flow and structure of the original video and weave in the target product's details.
You receive summary product details and MAY receive DETAILED PRODUCT INFORMATION, possibly derived from an uploaded PDF.
When detailed information is present you MUST prefer it for accuracy, depth and concrete examples; use the summary to fill gaps.

Produce a single cohesive script that feels like a natural evolution of the original, with:
1. an 'id' (e.g. "adapted_script_for_product_title");
2. a 'body' that follows the original video's structure and key messages, rewritten around the product;
3. a 'cta' suited to the product;
4. a 'hooks' array with one strong opening hook (more only if they arise naturally), each hook an object with "id" and "text".

Infer the pain points the product solves from its benefits and relate them to the original video's theme.
Keep a tone consistent with the original video.
The output MUST be a single valid JSON object with no markdown or other text around it."#;

pub const FRESH_SCRIPTS_SYSTEM_PROMPT: &str = r#"You are a creative scriptwriter producing fresh promotional scripts for a product (a workshop or a piece of IP).
You receive summary product details and MAY receive DETAILED PRODUCT INFORMATION, possibly derived from an uploaded PDF.
When detailed information is present you MUST prefer it for rich, specific scripts; use the summary to fill gaps.

For each of three duration targets (about 20s, 30s and 45s) provide:
1. 'id' (e.g. "version_20s"); 2. 'durationLabel' (e.g. "20 Seconds"); 3. 'versionTitle' (e.g. "20-Second Version");
4. 'description' (e.g. "With 3 alternative hooks");
5. 'hooks': exactly 3 objects, each with an "id" string (e.g. "hook_20s_1") AND a "text" string. The "id" key must always be present;
6. 'body'; 7. 'cta'; 8. 'estimatedDurationText' (e.g. "Estimated ~20 seconds").

Make the value proposition and learning outcomes clear, in an engaging and persuasive tone.
The output MUST be a valid JSON array of 3 objects with no markdown or other text around it."#;

pub const STATIC_REFERENCE_SYSTEM_PROMPT: &str = r#"You are a Creative Director adapting a reference static advertisement to a new product (a workshop or a piece of IP).
You receive a reference image, product details (possibly with DETAILED PRODUCT INFORMATION, which you MUST prefer), user callouts and a target aspect ratio.
1. Analyze the reference image: key visual elements, style, color palette, typography, mood and composition.
2. Write a concise, highly descriptive prompt for an AI image model that
   a. closely mirrors the reference's visual style, palette, lighting, typography and composition, describing them explicitly;
   b. makes every subject, scene, headline and promotional element about the target product;
   c. works in the user callouts;
   d. states the target aspect ratio.
The output MUST be one JSON object with the keys "referenceImageAnalysis" (string) and "generatedImagePrompt" (string), with no markdown or other text around it."#;

pub const STATIC_FRESH_SYSTEM_PROMPT: &str = r#"You are a Creative Director creating fresh static ad concepts for a product (a workshop or a piece of IP).
You receive product details (possibly with DETAILED PRODUCT INFORMATION, which you MUST prefer), user callouts and a target aspect ratio.
Write a concise, detailed prompt for an AI image model describing a new, original static ad that
  a. clearly promotes the product and its unique selling points;
  b. appeals to the product's target audience;
  c. works in the user callouts;
  d. states the target aspect ratio.
The output MUST be one JSON object with the key "generatedImagePrompt" (string), with no markdown or other text around it."#;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemPrompts {
    pub reference_script: String,
    pub fresh_scripts: String,
    pub static_reference: String,
    pub static_fresh: String,
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self {
            reference_script: REFERENCE_SCRIPT_SYSTEM_PROMPT.to_string(),
            fresh_scripts: FRESH_SCRIPTS_SYSTEM_PROMPT.to_string(),
            static_reference: STATIC_REFERENCE_SYSTEM_PROMPT.to_string(),
            static_fresh: STATIC_FRESH_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub text_api_key: Option<String>,
    pub image_api_key: Option<String>,
}

impl Credentials {
    pub fn text_key(&self) -> Result<&str, PipelineError> {
        present(&self.text_api_key).ok_or(PipelineError::MissingCredential(Service::TextGeneration))
    }

    pub fn image_key(&self) -> Result<&str, PipelineError> {
        present(&self.image_api_key).ok_or(PipelineError::MissingCredential(Service::ImageGeneration))
    }

    /// Fails before any work starts if the action needs a key that is absent.
    pub fn check(&self, action: Action) -> Result<(), PipelineError> {
        self.text_key()?;
        if action.uses_image_service() {
            self.image_key()?;
        }
        Ok(())
    }
}

fn present(key: &Option<String>) -> Option<&str> {
    key.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

/// Everything a run needs from settings, captured once at call time.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub credentials: Credentials,
    pub prompts: SystemPrompts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings {
    #[serde(default)]
    image_api_key: Option<String>,
    #[serde(default)]
    system_prompts: SystemPrompts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub text_api_key_configured: bool,
    pub image_api_key_configured: bool,
    pub system_prompts: SystemPrompts,
}

pub struct SettingsStore {
    path: PathBuf,
    text_api_key: Option<String>,
    state: RwLock<StoredSettings>,
    /// Serializes writers so file and memory move together.
    writes: tokio::sync::Mutex<()>,
}

impl SettingsStore {
    /// Loads the settings file, if any. `image_key_fallback` only fills an
    /// image key the file does not already hold.
    pub fn load(path: impl Into<PathBuf>, text_api_key: Option<String>, image_key_fallback: Option<String>) -> Result<Self, SettingsError> {
        let path = path.into();
        let mut stored = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<StoredSettings>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("⚙️ No settings file at {}, starting with defaults", path.display());
                StoredSettings::default()
            }
            Err(source) => return Err(SettingsError::Io { path: path.display().to_string(), source }),
        };
        if present(&stored.image_api_key).is_none() {
            stored.image_api_key = image_key_fallback;
        }
        if present(&text_api_key).is_none() {
            warn!("⚠️ GEMINI_API_KEY is not configured; script and prompt generation will be refused");
        }
        if present(&stored.image_api_key).is_none() {
            warn!("⚠️ No image generation API key configured; set one through the settings API");
        }
        Ok(Self { path, text_api_key, state: RwLock::new(stored), writes: tokio::sync::Mutex::new(()) })
    }

    pub fn snapshot(&self) -> RunSettings {
        let state = self.state.read();
        RunSettings {
            credentials: Credentials {
                text_api_key: self.text_api_key.clone(),
                image_api_key: state.image_api_key.clone(),
            },
            prompts: state.system_prompts.clone(),
        }
    }

    pub fn view(&self) -> SettingsView {
        let state = self.state.read();
        SettingsView {
            text_api_key_configured: present(&self.text_api_key).is_some(),
            image_api_key_configured: present(&state.image_api_key).is_some(),
            system_prompts: state.system_prompts.clone(),
        }
    }

    /// A blank key clears the stored one.
    pub async fn set_image_api_key(&self, key: &str) -> Result<(), SettingsError> {
        let trimmed = key.trim();
        let key = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self.commit(|state| state.image_api_key = key).await
    }

    pub async fn set_system_prompts(&self, prompts: SystemPrompts) -> Result<(), SettingsError> {
        self.commit(|state| state.system_prompts = prompts).await
    }

    /// Applies `change` to a copy, writes the file, and only then swaps the
    /// copy in. A failed write leaves the running settings untouched.
    async fn commit(&self, change: impl FnOnce(&mut StoredSettings)) -> Result<(), SettingsError> {
        let _writing = self.writes.lock().await;
        let mut next = self.state.read().clone();
        change(&mut next);
        self.persist(serde_json::to_string_pretty(&next)?).await?;
        *self.state.write() = next;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, serialized: String) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io { path: self.path.display().to_string(), source };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&self.path, serialized).await.map_err(io_err)?;
        info!("💾 Settings saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn image_key_survives_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SettingsStore::load(&path, Some("gem".into()), None).unwrap();
        assert!(!store.view().image_api_key_configured);
        store.set_image_api_key("  sk-test  ").await.unwrap();

        let reloaded = SettingsStore::load(&path, Some("gem".into()), Some("env-key".into())).unwrap();
        assert_eq!(reloaded.snapshot().credentials.image_api_key.as_deref(), Some("sk-test"));
    }

    #[tokio::test]
    async fn blank_key_clears_and_env_fallback_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::load(&path, None, Some("env-key".into())).unwrap();
        assert_eq!(store.snapshot().credentials.image_api_key.as_deref(), Some("env-key"));

        store.set_image_api_key("   ").await.unwrap();
        assert!(store.snapshot().credentials.image_api_key.is_none());
    }

    #[tokio::test]
    async fn partial_prompt_overrides_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"systemPrompts": {"freshScripts": "Be brief."}}"#).unwrap();

        let store = SettingsStore::load(&path, None, None).unwrap();
        let prompts = store.snapshot().prompts;
        assert_eq!(prompts.fresh_scripts, "Be brief.");
        assert_eq!(prompts.reference_script, REFERENCE_SCRIPT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn failed_write_leaves_settings_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::load(&path, Some("gem".into()), None).unwrap();
        // A directory where the file should go makes every write fail.
        std::fs::create_dir(&path).unwrap();

        let err = store.set_image_api_key("sk-test").await.unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
        assert!(store.snapshot().credentials.image_api_key.is_none());
        assert!(!store.view().image_api_key_configured);

        let prompts = SystemPrompts { fresh_scripts: "Rhyme.".into(), ..SystemPrompts::default() };
        assert!(store.set_system_prompts(prompts).await.is_err());
        assert_eq!(store.snapshot().prompts, SystemPrompts::default());
    }

    #[test]
    fn credentials_gate_actions() {
        let creds = Credentials { text_api_key: Some("gem".into()), image_api_key: Some(" ".into()) };
        assert!(creds.check(Action::GenerateFreshScripts).is_ok());
        assert!(matches!(
            creds.check(Action::GenerateStaticAd),
            Err(PipelineError::MissingCredential(Service::ImageGeneration))
        ));

        let creds = Credentials::default();
        assert!(matches!(
            creds.check(Action::AdaptVideoScript),
            Err(PipelineError::MissingCredential(Service::TextGeneration))
        ));
    }
}

//! Staged orchestration: prompt, remote call, tolerant parse, validation.
//!
//! Each run walks `Idle -> Staging(n) -> ... -> Complete | Failed`. A stage
//! only starts once the previous one produced a validated value, and any
//! failure aborts the run with nothing partial returned.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;
use tracing::{debug, error, info, warn};

use crate::{
    config::ModelConfig,
    error::{PipelineError, Service},
    media::InlineMedia,
    models::{AspectRatio, ExtractedProductDetails, GenerationRequest, PipelineResult, Product, VideoAnalysis},
    parser::{parse_response, ExpectedShape},
    prompts::{self, Prompt},
    remote::{ImageGenerator, ImageRequest, TextGenerator, TextRequest},
    repository::ProductRepository,
    settings::RunSettings,
    validate::{self, ImageFailure, ShapeError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AnalyzeVideo,
    AdaptScript,
    GenerateFreshScripts,
    BuildImagePrompt,
    RenderImage,
    ExtractPdf,
}

impl Stage {
    /// Progress line shown to the user while the stage runs.
    pub fn description(self) -> &'static str {
        match self {
            Stage::AnalyzeVideo => "Analyzing the reference video...",
            Stage::AdaptScript => "Adapting the script to the product...",
            Stage::GenerateFreshScripts => "Generating fresh script variations...",
            Stage::BuildImagePrompt => "Crafting the image prompt...",
            Stage::RenderImage => "Rendering the ad image...",
            Stage::ExtractPdf => "Analyzing the PDF to auto-fill product fields...",
        }
    }

    pub fn service(self) -> Service {
        match self {
            Stage::RenderImage => Service::ImageGeneration,
            _ => Service::TextGeneration,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::AnalyzeVideo => "video analysis",
            Stage::AdaptScript => "script adaptation",
            Stage::GenerateFreshScripts => "fresh script generation",
            Stage::BuildImagePrompt => "image prompt generation",
            Stage::RenderImage => "image rendering",
            Stage::ExtractPdf => "PDF extraction",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    AdaptVideoScript,
    GenerateFreshScripts,
    GenerateStaticAd,
    ExtractProductDetails,
}

impl Action {
    pub fn for_request(request: &GenerationRequest) -> Self {
        match request {
            GenerationRequest::VideoReference { .. } => Action::AdaptVideoScript,
            GenerationRequest::VideoFresh { .. } => Action::GenerateFreshScripts,
            GenerationRequest::StaticReference { .. } | GenerationRequest::StaticFresh { .. } => Action::GenerateStaticAd,
        }
    }

    pub fn stages(self) -> &'static [Stage] {
        match self {
            Action::AdaptVideoScript => &[Stage::AnalyzeVideo, Stage::AdaptScript],
            Action::GenerateFreshScripts => &[Stage::GenerateFreshScripts],
            Action::GenerateStaticAd => &[Stage::BuildImagePrompt, Stage::RenderImage],
            Action::ExtractProductDetails => &[Stage::ExtractPdf],
        }
    }

    pub fn uses_image_service(self) -> bool {
        self.stages().iter().any(|s| s.service() == Service::ImageGeneration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RunState {
    Idle,
    Staging { step: usize, stage: Stage },
    Complete,
    Failed { stage: Option<Stage> },
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub result: PipelineResult,
    pub video_analysis: Option<VideoAnalysis>,
    pub warnings: Vec<String>,
    pub image_failures: Vec<ImageFailure>,
    pub trail: Vec<RunState>,
}

/// Bookkeeping for one run. Lives on the caller's stack only.
struct Run {
    action: Action,
    trail: Vec<RunState>,
    current: Option<Stage>,
    warnings: Vec<String>,
    image_failures: Vec<ImageFailure>,
    video_analysis: Option<VideoAnalysis>,
}

impl Run {
    fn new(action: Action) -> Self {
        info!("🚀 Starting {:?} ({} stage(s))", action, action.stages().len());
        Self {
            action,
            trail: vec![RunState::Idle],
            current: None,
            warnings: Vec::new(),
            image_failures: Vec::new(),
            video_analysis: None,
        }
    }

    fn enter(&mut self, stage: Stage) {
        let step = self.trail.iter().filter(|s| matches!(s, RunState::Staging { .. })).count() + 1;
        info!("🎯 [{}/{}] {}", step, self.action.stages().len(), stage.description());
        self.current = Some(stage);
        self.trail.push(RunState::Staging { step, stage });
    }

    fn warn(&mut self, message: String) {
        warn!("⚠️ {}: {}", self.current.map(|s| s.to_string()).unwrap_or_default(), message);
        self.warnings.push(message);
    }

    fn fail(&mut self, err: &PipelineError) {
        error!("❌ {:?} failed: {}", self.action, err);
        self.trail.push(RunState::Failed { stage: self.current });
    }

    fn complete(mut self, result: PipelineResult) -> PipelineOutput {
        self.trail.push(RunState::Complete);
        info!("✅ {:?} complete with {} warning(s)", self.action, self.warnings.len());
        PipelineOutput {
            result,
            video_analysis: self.video_analysis,
            warnings: self.warnings,
            image_failures: self.image_failures,
            trail: self.trail,
        }
    }
}

fn shape(stage: Stage) -> impl FnOnce(ShapeError) -> PipelineError {
    move |e| PipelineError::InvalidResponseShape { stage, field: e.field, detail: e.detail }
}

fn preview(text: &str, max_chars: usize) -> String {
    let clipped: String = text.chars().take(max_chars).collect();
    if clipped.len() < text.len() { format!("{clipped}...") } else { clipped }
}

pub struct GenerationPipeline {
    products: Arc<dyn ProductRepository>,
    text: Arc<dyn TextGenerator>,
    images: Arc<dyn ImageGenerator>,
    models: ModelConfig,
}

impl GenerationPipeline {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        text: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        models: ModelConfig,
    ) -> Self {
        Self { products, text, images, models }
    }

    /// Runs the stages for `request` using the settings captured by the caller.
    pub async fn run(&self, request: &GenerationRequest, settings: &RunSettings) -> Result<PipelineOutput, PipelineError> {
        let action = Action::for_request(request);
        settings.credentials.check(action)?;
        let product = self.load_product(request.product_id()).await?;

        let callouts = request.callouts();
        if let Some(callouts) = callouts {
            debug!("📝 User callouts: {}", preview(callouts, 120));
        }

        let mut run = Run::new(action);
        let outcome = match request {
            GenerationRequest::VideoReference { video, .. } => {
                self.adapt_video_script(&mut run, &product, video, callouts, settings).await
            }
            GenerationRequest::VideoFresh { .. } => self.fresh_scripts(&mut run, &product, callouts, settings).await,
            GenerationRequest::StaticReference { image, aspect_ratio, .. } => {
                self.static_ad(&mut run, &product, Some(image), *aspect_ratio, callouts, settings).await
            }
            GenerationRequest::StaticFresh { aspect_ratio, .. } => {
                self.static_ad(&mut run, &product, None, *aspect_ratio, callouts, settings).await
            }
        };

        match outcome {
            Ok(result) => Ok(run.complete(result)),
            Err(err) => {
                run.fail(&err);
                Err(err)
            }
        }
    }

    /// Reads a product PDF and returns whatever fields the model could recover.
    pub async fn extract_product_details(
        &self,
        pdf: InlineMedia,
        settings: &RunSettings,
    ) -> Result<ExtractedProductDetails, PipelineError> {
        let action = Action::ExtractProductDetails;
        settings.credentials.check(action)?;
        let key = settings.credentials.text_key()?;

        let mut run = Run::new(action);
        let outcome = self
            .text_stage(&mut run, Stage::ExtractPdf, key, &self.models.text_model, prompts::pdf_extraction_prompt(pdf), ExpectedShape::Object)
            .await
            .and_then(|value| validate::extracted_details(value).map_err(shape(Stage::ExtractPdf)));

        match outcome {
            Ok(details) => {
                run.trail.push(RunState::Complete);
                info!("✅ Extracted details for {:?}", details.title.as_deref().unwrap_or("untitled product"));
                Ok(details)
            }
            Err(err) => {
                run.fail(&err);
                Err(err)
            }
        }
    }

    async fn load_product(&self, id: &str) -> Result<Product, PipelineError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(PipelineError::NoProductSelected);
        }
        let product = self
            .products
            .get_by_id(id)
            .await?
            .ok_or_else(|| PipelineError::ProductNotFound(id.to_string()))?;
        info!(
            "📦 Loaded product '{}' ({}detailed document)",
            product.summary.title,
            if product.detailed_doc().is_some() { "" } else { "no " }
        );
        Ok(product)
    }

    async fn adapt_video_script(
        &self,
        run: &mut Run,
        product: &Product,
        video: &InlineMedia,
        callouts: Option<&str>,
        settings: &RunSettings,
    ) -> Result<PipelineResult, PipelineError> {
        let key = settings.credentials.text_key()?;

        let value = self
            .text_stage(run, Stage::AnalyzeVideo, key, &self.models.video_model, prompts::video_analysis_prompt(video.clone()), ExpectedShape::Object)
            .await?;
        let analysis = validate::video_analysis(&value).map_err(shape(Stage::AnalyzeVideo))?;
        debug!("Transcript preview: {}", preview(&analysis.transcription, 120));

        let prompt = prompts::reference_adaptation_prompt(
            &analysis,
            &product.summary,
            product.detailed_doc(),
            callouts,
            &settings.prompts.reference_script,
        );
        let value = self
            .text_stage(run, Stage::AdaptScript, key, &self.models.text_model, prompt, ExpectedShape::Object)
            .await?;
        let mut script = validate::adapted_script(&value).map_err(shape(Stage::AdaptScript))?;
        if script.id.trim().is_empty() {
            script.id = format!("adapted_script_for_{}", prompts::title_slug(&product.summary.title));
        }

        run.video_analysis = Some(analysis);
        Ok(PipelineResult::Scripts(vec![script]))
    }

    async fn fresh_scripts(
        &self,
        run: &mut Run,
        product: &Product,
        callouts: Option<&str>,
        settings: &RunSettings,
    ) -> Result<PipelineResult, PipelineError> {
        let key = settings.credentials.text_key()?;
        let prompt = prompts::fresh_scripts_prompt(&product.summary, product.detailed_doc(), callouts, &settings.prompts.fresh_scripts);
        let value = self
            .text_stage(run, Stage::GenerateFreshScripts, key, &self.models.text_model, prompt, ExpectedShape::Array)
            .await?;

        let checked = validate::fresh_scripts(&value).map_err(shape(Stage::GenerateFreshScripts))?;
        for warning in checked.warnings {
            run.warn(warning);
        }
        Ok(PipelineResult::Scripts(checked.value))
    }

    async fn static_ad(
        &self,
        run: &mut Run,
        product: &Product,
        reference: Option<&InlineMedia>,
        aspect_ratio: AspectRatio,
        callouts: Option<&str>,
        settings: &RunSettings,
    ) -> Result<PipelineResult, PipelineError> {
        let text_key = settings.credentials.text_key()?;
        let image_key = settings.credentials.image_key()?;
        let system = match reference {
            Some(_) => &settings.prompts.static_reference,
            None => &settings.prompts.static_fresh,
        };

        let prompt = prompts::image_prompt_generation_prompt(
            &product.summary,
            product.detailed_doc(),
            callouts,
            aspect_ratio,
            reference.cloned(),
            &self.models.image_model,
            system,
        );
        let value = self
            .text_stage(run, Stage::BuildImagePrompt, text_key, &self.models.text_model, prompt, ExpectedShape::Object)
            .await?;
        let checked = validate::image_prompt(&value, reference.is_some()).map_err(shape(Stage::BuildImagePrompt))?;
        for warning in checked.warnings {
            run.warn(warning);
        }
        let image_prompt = checked.value;
        info!("🖌️ Image prompt: {}", preview(&image_prompt.generated_image_prompt, 120));

        run.enter(Stage::RenderImage);
        let request = ImageRequest {
            model: self.models.image_model.clone(),
            prompt: image_prompt.generated_image_prompt.clone(),
            count: self.models.image_count,
        };
        let images = self
            .images
            .generate(image_key, request)
            .await
            .map_err(|e| PipelineError::remote(Service::ImageGeneration, e))?;
        info!("📥 Image service returned {} entr{}", images.len(), if images.len() == 1 { "y" } else { "ies" });

        let reference_analysis = reference.and(image_prompt.reference_image_analysis.as_deref());
        let checked = validate::rendered_images(images, &image_prompt.generated_image_prompt, reference_analysis)
            .map_err(shape(Stage::RenderImage))?;
        for warning in checked.warnings {
            run.warn(warning);
        }
        run.image_failures = checked.value.failures;
        Ok(PipelineResult::Ads(checked.value.ads))
    }

    async fn text_stage(
        &self,
        run: &mut Run,
        stage: Stage,
        api_key: &str,
        model: &str,
        prompt: Prompt,
        expected: ExpectedShape,
    ) -> Result<Value, PipelineError> {
        run.enter(stage);
        debug!(
            "📤 {} prompt ({} media part(s)): {}",
            stage,
            prompt.media_count(),
            preview(&prompt.text(), 200)
        );

        let request = TextRequest { model: model.to_string(), prompt };
        let raw = self
            .text
            .generate(api_key, request)
            .await
            .map_err(|e| PipelineError::remote(stage.service(), e))?;
        info!("📥 {} answered with {} chars", stage, raw.len());

        parse_response(&raw, expected).map_err(|e| PipelineError::MalformedResponse {
            stage,
            raw_text_preview: e.raw_text_preview,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_static_ads_need_the_image_service() {
        assert!(Action::GenerateStaticAd.uses_image_service());
        assert!(!Action::AdaptVideoScript.uses_image_service());
        assert!(!Action::GenerateFreshScripts.uses_image_service());
        assert!(!Action::ExtractProductDetails.uses_image_service());
    }

    #[test]
    fn requests_map_to_their_stage_sequence() {
        let video = InlineMedia { mime_type: "video/mp4".into(), data: "AAAA".into() };
        let request = GenerationRequest::VideoReference { product_id: "p".into(), video, callouts: None };
        assert_eq!(Action::for_request(&request).stages(), &[Stage::AnalyzeVideo, Stage::AdaptScript]);

        let request = GenerationRequest::StaticFresh { product_id: "p".into(), aspect_ratio: AspectRatio::Wide, callouts: None };
        assert_eq!(Action::for_request(&request).stages(), &[Stage::BuildImagePrompt, Stage::RenderImage]);
    }

    #[test]
    fn run_trail_counts_steps() {
        let mut run = Run::new(Action::GenerateStaticAd);
        run.enter(Stage::BuildImagePrompt);
        run.enter(Stage::RenderImage);
        let output = run.complete(PipelineResult::Ads(Vec::new()));
        assert_eq!(
            output.trail,
            vec![
                RunState::Idle,
                RunState::Staging { step: 1, stage: Stage::BuildImagePrompt },
                RunState::Staging { step: 2, stage: Stage::RenderImage },
                RunState::Complete,
            ]
        );
    }

    #[test]
    fn run_state_serializes_with_a_tag() {
        let json = serde_json::to_value(RunState::Staging { step: 1, stage: Stage::AnalyzeVideo }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "staging", "step": 1, "stage": "analyze_video"}));
    }
}

use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use chrono::{DateTime, Utc};

use crate::{error::PipelineError, media::InlineMedia};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductCategory {
    Workshop,
    Ip,
}

/// A session description is either a paragraph or a list of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionDescription {
    Text(String),
    Points(Vec<String>),
}

impl SessionDescription {
    pub fn joined(&self) -> String {
        match self {
            SessionDescription::Text(text) => text.clone(),
            SessionDescription::Points(points) => points.join(", "),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session: String,
    pub time: Option<String>,
    pub day: Option<String>,
    pub description: Option<SessionDescription>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductModule {
    pub title: String,
    pub content: String,
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

/// Fields every prompt is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub target_audience: Vec<String>,
    #[serde(default)]
    pub sessions: Vec<SessionInfo>,
}

/// Long-form documentation, usually filled in from an uploaded PDF.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    pub full_description: Option<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub modules: Vec<ProductModule>,
    pub target_audience_deep_dive: Option<String>,
    #[serde(default)]
    pub unique_selling_points_detailed: Vec<String>,
    #[serde(default)]
    pub faqs: Vec<Faq>,
    #[serde(default)]
    pub mentors: Vec<String>,
    pub guarantee: Option<String>,
    pub certificate_info: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub testimonials: Vec<String>,
    pub registration_link: Option<String>,
    pub refund_policy: Option<String>,
    pub price: Option<String>,
    pub discount_deadline: Option<String>,
}

impl ProductDetails {
    pub fn is_empty(&self) -> bool {
        fn blank(value: &Option<String>) -> bool {
            value.as_deref().map_or(true, |s| s.trim().is_empty())
        }
        blank(&self.full_description)
            && self.learning_objectives.is_empty()
            && self.modules.is_empty()
            && blank(&self.target_audience_deep_dive)
            && self.unique_selling_points_detailed.is_empty()
            && self.faqs.is_empty()
            && self.mentors.is_empty()
            && blank(&self.guarantee)
            && blank(&self.certificate_info)
            && self.links.is_empty()
            && self.testimonials.is_empty()
            && blank(&self.registration_link)
            && blank(&self.refund_policy)
            && blank(&self.price)
            && blank(&self.discount_deadline)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfAttachment {
    #[serde(rename = "pdfOriginalName")]
    pub original_name: String,
    #[serde(rename = "pdfStoragePath")]
    pub storage_path: String,
    #[serde(rename = "pdfDownloadURL")]
    pub download_url: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub product_category: ProductCategory,
    #[serde(flatten)]
    pub summary: ProductSummary,
    #[serde(flatten)]
    pub details: ProductDetails,
    #[serde(flatten)]
    pub pdf: Option<PdfAttachment>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// The detailed document, if any detailed field carries content.
    pub fn detailed_doc(&self) -> Option<&ProductDetails> {
        (!self.details.is_empty()).then_some(&self.details)
    }
}

/// Product as submitted for create/update. Mandatory fields are optional here
/// so that missing ones surface as a validation error instead of a parse error.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub id: Option<String>,
    pub product_category: Option<ProductCategory>,
    #[serde(flatten)]
    pub summary: ProductSummary,
    #[serde(flatten)]
    pub details: ProductDetails,
    /// Name of the attachment to keep on update; `None` drops an existing PDF.
    pub pdf_original_name: Option<String>,
}

impl From<Product> for ProductDraft {
    fn from(product: Product) -> Self {
        Self {
            id: Some(product.id),
            product_category: Some(product.product_category),
            summary: product.summary,
            details: product.details,
            pdf_original_name: product.pdf.map(|p| p.original_name),
        }
    }
}

/// Fields recovered from a product PDF. Nothing is guaranteed to be present.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedProductDetails {
    pub title: Option<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub target_audience: Vec<String>,
    #[serde(default)]
    pub sessions: Vec<SessionInfo>,
    #[serde(flatten)]
    pub details: ProductDetails,
}

// --- Generation ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptHook {
    pub id: String,
    pub text: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptVariation {
    pub id: String,
    pub duration_label: Option<String>,
    pub version_title: Option<String>,
    pub description: Option<String>,
    pub hooks: Vec<ScriptHook>,
    pub body: String,
    pub cta: String,
    pub estimated_duration_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptAnalysis {
    pub tone: String,
    pub structure: String,
    pub hooks: Vec<String>,
    pub ctas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnalysis {
    pub transcription: String,
    pub visual_summary: String,
    pub original_script_analysis: ScriptAnalysis,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePromptResult {
    pub generated_image_prompt: String,
    pub reference_image_analysis: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAd {
    pub id: String,
    /// `data:` URL carrying the rendered pixels.
    pub image_url: String,
    pub prompt_used: String,
    pub reference_analysis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "camelCase")]
pub enum PipelineResult {
    Scripts(Vec<ScriptVariation>),
    Ads(Vec<GeneratedAd>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Vertical,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "4:5")]
    Portrait,
}

impl AspectRatio {
    pub fn prompt_text(self) -> &'static str {
        match self {
            AspectRatio::Square => "square (1:1 aspect ratio)",
            AspectRatio::Vertical => "vertical story/reel format (9:16 aspect ratio)",
            AspectRatio::Wide => "wide banner (16:9 aspect ratio)",
            AspectRatio::Portrait => "portrait post format (4:5 aspect ratio)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    Video,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptingMode {
    Reference,
    Fresh,
}

/// Loosely typed generation input as it arrives from a form.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateForm {
    pub mode: AppMode,
    pub scripting: ScriptingMode,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub callouts: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    VideoReference { product_id: String, video: InlineMedia, callouts: Option<String> },
    VideoFresh { product_id: String, callouts: Option<String> },
    StaticReference { product_id: String, image: InlineMedia, aspect_ratio: AspectRatio, callouts: Option<String> },
    StaticFresh { product_id: String, aspect_ratio: AspectRatio, callouts: Option<String> },
}

impl GenerationRequest {
    pub fn from_form(form: GenerateForm, media: Option<InlineMedia>) -> Result<Self, PipelineError> {
        let product_id = form
            .product_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(PipelineError::NoProductSelected)?;
        let callouts = form.callouts.filter(|c| !c.trim().is_empty());
        let aspect_ratio = form.aspect_ratio.unwrap_or_default();

        Ok(match (form.mode, form.scripting) {
            (AppMode::Video, ScriptingMode::Reference) => GenerationRequest::VideoReference {
                product_id,
                video: media.ok_or(PipelineError::MissingMedia("an ad video is required in reference mode"))?,
                callouts,
            },
            (AppMode::Video, ScriptingMode::Fresh) => GenerationRequest::VideoFresh { product_id, callouts },
            (AppMode::Static, ScriptingMode::Reference) => GenerationRequest::StaticReference {
                product_id,
                image: media.ok_or(PipelineError::MissingMedia("a reference image is required in reference mode"))?,
                aspect_ratio,
                callouts,
            },
            (AppMode::Static, ScriptingMode::Fresh) => GenerationRequest::StaticFresh { product_id, aspect_ratio, callouts },
        })
    }

    pub fn product_id(&self) -> &str {
        match self {
            GenerationRequest::VideoReference { product_id, .. }
            | GenerationRequest::VideoFresh { product_id, .. }
            | GenerationRequest::StaticReference { product_id, .. }
            | GenerationRequest::StaticFresh { product_id, .. } => product_id,
        }
    }

    pub fn callouts(&self) -> Option<&str> {
        match self {
            GenerationRequest::VideoReference { callouts, .. }
            | GenerationRequest::VideoFresh { callouts, .. }
            | GenerationRequest::StaticReference { callouts, .. }
            | GenerationRequest::StaticFresh { callouts, .. } => callouts.as_deref(),
        }
    }
}

//! Prompt builders, one per pipeline stage. All of them are pure.

use crate::{
    media::InlineMedia,
    models::{AspectRatio, ProductDetails, ProductSummary, VideoAnalysis},
};

pub const DETAILED_BLOCK_START: &str =
    "== DETAILED PRODUCT INFORMATION (Prioritize this; it may come from the product's uploaded PDF) ==";
pub const DETAILED_BLOCK_END: &str = "== END OF DETAILED PRODUCT INFORMATION ==";
pub const CALLOUTS_BLOCK_START: &str = "== USER SPECIFIC CALLOUTS/REQUESTS ==";
pub const CALLOUTS_BLOCK_END: &str = "== END OF USER SPECIFIC CALLOUTS/REQUESTS ==";
pub const SUMMARY_HEADING: &str = "Target Product Summary Details:";

const TRANSCRIPT_CLIP: usize = 2000;
const MODULE_CLIP: usize = 200;
const SESSION_CLIP: usize = 70;

#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Media(InlineMedia),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system_instruction: Option<String>,
    pub parts: Vec<PromptPart>,
    /// Ask the service to answer with `application/json`.
    pub json_response: bool,
}

impl Prompt {
    fn json(system_instruction: Option<&str>, parts: Vec<PromptPart>) -> Self {
        Self {
            system_instruction: system_instruction.map(str::to_string),
            parts,
            json_response: true,
        }
    }

    /// All text parts joined, for logging and assertions.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text(t) => Some(t.as_str()),
                PromptPart::Media(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn media_count(&self) -> usize {
        self.parts.iter().filter(|p| matches!(p, PromptPart::Media(_))).count()
    }
}

/// How much of the summary to inline. Adaptation and image prompts keep it short.
#[derive(Debug, Clone, Copy)]
enum SummaryDepth {
    Brief,
    Full,
}

pub fn video_analysis_prompt(video: InlineMedia) -> Prompt {
    let instructions = r#"Analyze this video thoroughly and answer with one JSON object holding:
  1. "transcription": a precise transcription of every spoken word.
  2. "visualSummary": a concise summary of the key visuals, scenes and on-screen text.
  3. "originalScriptAnalysis": an object with
     - "tone": the overall tone and style (e.g. "energetic and motivational").
     - "structure": a short outline of the structure (e.g. "Problem-Solution-CTA").
     - "hooks": up to 3 opening lines or questions meant to grab attention, as strings. Use [] if there are none.
     - "ctas": up to 3 calls to action, as strings. Use [] if there are none.
Do not add any text or markdown before or after the JSON object.
Example:
{
  "transcription": "Welcome back! Today we're talking about...",
  "visualSummary": "A presenter speaks to camera with b-roll of a city and captions such as 'Tip 1'.",
  "originalScriptAnalysis": {
    "tone": "Informal and friendly",
    "structure": "Intro - Three tips - Summary - CTA",
    "hooks": ["Tired of X?"],
    "ctas": ["Subscribe for more!"]
  }
}"#;
    Prompt::json(None, vec![PromptPart::Media(video), PromptPart::Text(instructions.to_string())])
}

pub fn reference_adaptation_prompt(
    analysis: &VideoAnalysis,
    summary: &ProductSummary,
    details: Option<&ProductDetails>,
    callouts: Option<&str>,
    system: &str,
) -> Prompt {
    let script = &analysis.original_script_analysis;
    let slug = title_slug(&summary.title);
    let text = format!(
        r#"Original Video Details to Adapt:
- Transcription Snippet: "{transcript}..."
- Visual Context: "{visuals}"
- Original Tone to Emulate: "{tone}"
- Original Structure to Follow: "{structure}"
- Original Hooks: {hooks}
- Original CTAs: {ctas}

{context}{callouts}

Task:
TRANSFORM the transcription snippet above so that it promotes '{title}'.
The 'body' must be a deep adaptation of the original transcription: keep its narrative flow, sentence rhythm and style,
and actively reweave it with specifics of the product, preferring the detailed product information when it is present.
1. Substitute general phrases with concrete benefits, module names or learning objectives of the product.
2. Expand on points where product content fits naturally and speak directly to its target audience.
3. Address every user callout, if any were given.
4. Keep the original core message and structure recognizable.

Return ONLY one valid JSON object (not an array) shaped like:
{{
  "id": "adapted_script_for_{slug}",
  "hooks": [
    {{"id": "hook_adapted_1", "text": "One strong opening hook."}}
  ],
  "body": "The adapted script body...",
  "cta": "A clear call to action for the product..."
}}
Every hook object must carry both "id" and "text" strings."#,
        transcript = clip(&analysis.transcription, TRANSCRIPT_CLIP),
        visuals = analysis.visual_summary,
        tone = script.tone,
        structure = script.structure,
        hooks = json_list(&script.hooks, usize::MAX),
        ctas = json_list(&script.ctas, usize::MAX),
        context = product_context(summary, details, SummaryDepth::Brief),
        callouts = callouts_block(callouts),
        title = summary.title,
    );
    Prompt::json(Some(system), vec![PromptPart::Text(text)])
}

pub fn fresh_scripts_prompt(
    summary: &ProductSummary,
    details: Option<&ProductDetails>,
    callouts: Option<&str>,
    system: &str,
) -> Prompt {
    let text = format!(
        r#"{context}{callouts}

Task:
Write 3 fresh, creative and distinct promotional script variations for '{title}', targeting roughly 20s, 30s and 45s.
Each variation needs its own set of exactly 3 hooks.
If detailed product information was provided, make the scripts rich with its specifics.
If user callouts were provided, work them in.

Return ONLY a valid JSON array of 3 objects. Every hook object must include an "id" string and a "text" string.
Example element:
{{
  "id": "version_20s",
  "durationLabel": "20 Seconds",
  "versionTitle": "20-Second Version",
  "description": "With 3 alternative hooks",
  "hooks": [
    {{"id": "hook_20s_1", "text": "Hook one..."}},
    {{"id": "hook_20s_2", "text": "Hook two..."}},
    {{"id": "hook_20s_3", "text": "Hook three..."}}
  ],
  "body": "Script body for the 20s version...",
  "cta": "Short call to action.",
  "estimatedDurationText": "Estimated ~20 seconds"
}}"#,
        context = product_context(summary, details, SummaryDepth::Full),
        callouts = callouts_block(callouts),
        title = summary.title,
    );
    Prompt::json(Some(system), vec![PromptPart::Text(text)])
}

pub fn image_prompt_generation_prompt(
    summary: &ProductSummary,
    details: Option<&ProductDetails>,
    callouts: Option<&str>,
    aspect_ratio: AspectRatio,
    reference_image: Option<InlineMedia>,
    image_model: &str,
    system: &str,
) -> Prompt {
    let body = format!(
        "{context}{callouts}\n\nTarget Image Aspect Ratio: {aspect}",
        context = product_context(summary, details, SummaryDepth::Brief),
        callouts = callouts_block(callouts),
        aspect = aspect_ratio.prompt_text(),
    );

    match reference_image {
        Some(image) => {
            let text = format!(
                "You are given a reference image (above) and product details.\n{body}\n\n\
                 Task: Analyze the reference image and write an image-generation prompt for the {image_model} model. \
                 The described image must closely mirror the reference's visual style, palette, lighting, typography and composition, \
                 while its subject matter, headlines and promotional content are entirely about the product.\n\
                 Return ONLY one JSON object with the keys \"referenceImageAnalysis\" (string) and \"generatedImagePrompt\" (string)."
            );
            Prompt::json(Some(system), vec![PromptPart::Media(image), PromptPart::Text(text)])
        }
        None => {
            let text = format!(
                "{body}\n\n\
                 Task: Write an image-generation prompt for the {image_model} model describing a wholly original static ad composition \
                 that promotes the product to its target audience.\n\
                 Return ONLY one JSON object with the key \"generatedImagePrompt\" (string)."
            );
            Prompt::json(Some(system), vec![PromptPart::Text(text)])
        }
    }
}

pub fn pdf_extraction_prompt(pdf: InlineMedia) -> Prompt {
    let instructions = r#"Analyze the attached PDF, which describes a product such as a workshop or a piece of intellectual property.
Extract the information below and return it as ONE valid JSON object, with no markdown or other text around it.

When something is not clearly present in the PDF:
- use null for string fields;
- use [] for array fields.
Never omit a key.

JSON structure (field names exactly as written, camelCase):
{
  "title": "string | null",
  "fullDescription": "string | null",
  "price": "string | null",
  "discountDeadline": "string | null",
  "benefits": ["string"],
  "targetAudience": ["string"],
  "learningObjectives": ["string"],
  "modules": [{ "title": "string", "content": "string", "keywords": ["string"] | null }],
  "sessions": [{ "session": "string", "time": "string | null", "day": "string | null", "description": "string | string[] | null" }],
  "mentors": ["string"],
  "targetAudienceDeepDive": "string | null",
  "uniqueSellingPointsDetailed": ["string"],
  "faqs": [{ "question": "string", "answer": "string" }],
  "guarantee": "string | null",
  "certificateInfo": "string | null",
  "links": ["string"],
  "testimonials": ["string"],
  "registrationLink": "string | null",
  "refundPolicy": "string | null"
}

Stick to content actually present in the PDF. If it is short or unstructured, extract what is available."#;
    Prompt::json(None, vec![PromptPart::Media(pdf), PromptPart::Text(instructions.to_string())])
}

/// Detailed block (when present) followed by the summary fields.
fn product_context(summary: &ProductSummary, details: Option<&ProductDetails>, depth: SummaryDepth) -> String {
    let mut out = String::new();
    if let Some(details) = details {
        out.push_str(&detailed_block(details));
        out.push_str("\n\n");
    }

    out.push_str(SUMMARY_HEADING);
    out.push_str(&format!("\n- Title: \"{}\"", summary.title));
    match depth {
        SummaryDepth::Brief => {
            out.push_str(&format!("\n- Core Benefits: {}", json_list(&summary.benefits, 3)));
            out.push_str(&format!("\n- Target Audience: {}", json_list(&summary.target_audience, 2)));
        }
        SummaryDepth::Full => {
            out.push_str(&format!("\n- Benefits: {}", json_list(&summary.benefits, usize::MAX)));
            out.push_str(&format!("\n- Target Audience: {}", json_list(&summary.target_audience, usize::MAX)));
            out.push_str(&format!("\n- Key Sessions Overview: {}", sessions_overview(summary)));
        }
    }
    if details.is_none() {
        out.push_str("\nNo detailed product documentation was provided; rely on the summary.");
    }
    out
}

fn detailed_block(details: &ProductDetails) -> String {
    let mut lines = vec![DETAILED_BLOCK_START.to_string()];
    let mut push = |label: &str, value: String| lines.push(format!("{label}: {value}"));

    if let Some(text) = non_blank(&details.full_description) {
        push("Full Description", text.to_string());
    }
    if !details.learning_objectives.is_empty() {
        push("Key Learning Objectives", details.learning_objectives.join("; "));
    }
    if !details.modules.is_empty() {
        let modules = details
            .modules
            .iter()
            .map(|m| format!("\n  - Module: {}\n    Content Summary: {}", m.title, clip(&m.content, MODULE_CLIP)))
            .collect::<String>();
        push("Modules Overview", modules);
    }
    if let Some(text) = non_blank(&details.target_audience_deep_dive) {
        push("In-depth Target Audience", text.to_string());
    }
    if !details.unique_selling_points_detailed.is_empty() {
        push("Unique Selling Points", details.unique_selling_points_detailed.join("; "));
    }
    if !details.faqs.is_empty() {
        let faqs = details
            .faqs
            .iter()
            .map(|f| format!("\n  - Q: {}\n    A: {}", f.question, f.answer))
            .collect::<String>();
        push("FAQs", faqs);
    }
    if !details.mentors.is_empty() {
        push("Mentors", details.mentors.join(", "));
    }
    if !details.testimonials.is_empty() {
        push("Testimonials", details.testimonials.join(" | "));
    }
    for (label, value) in [
        ("Price", &details.price),
        ("Discount Deadline", &details.discount_deadline),
        ("Guarantee", &details.guarantee),
        ("Certificate", &details.certificate_info),
        ("Refund Policy", &details.refund_policy),
        ("Registration Info for CTA", &details.registration_link),
    ] {
        if let Some(text) = non_blank(value) {
            push(label, text.to_string());
        }
    }
    if !details.links.is_empty() {
        push("Links", details.links.join(", "));
    }

    lines.push(DETAILED_BLOCK_END.to_string());
    lines.join("\n")
}

fn callouts_block(callouts: Option<&str>) -> String {
    match callouts.map(str::trim).filter(|c| !c.is_empty()) {
        Some(text) => format!(
            "\n\n{CALLOUTS_BLOCK_START}\n{text}\n{CALLOUTS_BLOCK_END}\nAddress each of these requests explicitly."
        ),
        None => String::new(),
    }
}

fn sessions_overview(summary: &ProductSummary) -> String {
    if summary.sessions.is_empty() {
        return "General product focused on its benefits.".to_string();
    }
    summary
        .sessions
        .iter()
        .take(2)
        .map(|s| match s.description.as_ref().map(|d| d.joined()).filter(|d| !d.is_empty()) {
            Some(desc) => format!("{}: {}...", s.session, clip(&desc, SESSION_CLIP)),
            None => s.session.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn json_list(items: &[String], limit: usize) -> String {
    let items: Vec<&String> = items.iter().take(limit).collect();
    serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// `"Growth Lab 2"` -> `"growth_lab_2"`.
pub fn title_slug(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join("_").to_lowercase()
}

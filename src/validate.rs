//! Structural checks that turn parsed model output into typed results.
//!
//! The model is treated as an untrusted source: every required key is checked
//! by name so a failure can say exactly which field was missing or mistyped.

use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::{
    media::{self, InlineMedia},
    models::{ExtractedProductDetails, GeneratedAd, ImagePromptResult, ScriptAnalysis, ScriptHook, ScriptVariation, VideoAnalysis},
    remote::RenderedImage,
};

pub const EXPECTED_FRESH_VARIATIONS: usize = 3;
pub const EXPECTED_HOOKS_PER_VARIATION: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeError {
    pub field: String,
    pub detail: Option<String>,
}

impl ShapeError {
    fn field(field: impl Into<String>) -> Self {
        Self { field: field.into(), detail: None }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A validated value plus the non-fatal problems noticed on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Checked<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ImageFailure {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAds {
    pub ads: Vec<GeneratedAd>,
    pub failures: Vec<ImageFailure>,
}

pub fn video_analysis(value: &Value) -> Result<VideoAnalysis, ShapeError> {
    let obj = object(value, "$")?;
    let transcription = string(obj, "transcription", "transcription")?;
    if transcription.trim().is_empty() {
        return Err(ShapeError::field("transcription").with_detail("empty transcription"));
    }
    let visual_summary = string(obj, "visualSummary", "visualSummary")?;

    let analysis = obj
        .get("originalScriptAnalysis")
        .ok_or_else(|| ShapeError::field("originalScriptAnalysis"))?;
    let analysis = object(analysis, "originalScriptAnalysis")?;

    Ok(VideoAnalysis {
        transcription,
        visual_summary,
        original_script_analysis: ScriptAnalysis {
            tone: string(analysis, "tone", "originalScriptAnalysis.tone")?,
            structure: string(analysis, "structure", "originalScriptAnalysis.structure")?,
            hooks: string_list(analysis, "hooks", "originalScriptAnalysis.hooks")?,
            ctas: string_list(analysis, "ctas", "originalScriptAnalysis.ctas")?,
        },
    })
}

pub fn adapted_script(value: &Value) -> Result<ScriptVariation, ShapeError> {
    let obj = object(value, "$")?;
    script_core(obj)
}

pub fn fresh_scripts(value: &Value) -> Result<Checked<Vec<ScriptVariation>>, ShapeError> {
    let items = value
        .as_array()
        .ok_or_else(|| ShapeError::field("$").with_detail("expected an array of script variations"))?;
    if items.is_empty() {
        return Err(ShapeError::field("$").with_detail("no script variations returned"));
    }

    let mut warnings = Vec::new();
    if items.len() != EXPECTED_FRESH_VARIATIONS {
        warnings.push(format!(
            "expected {EXPECTED_FRESH_VARIATIONS} script variations, received {}",
            items.len()
        ));
    }

    let mut variations = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let label = || {
            let id = item.get("id").and_then(Value::as_str).unwrap_or("unknown id");
            format!("variation {} ({id})", index + 1)
        };
        let obj = object(item, "[]").map_err(|e| e.with_detail(label()))?;
        let mut variation = script_core(obj).map_err(|e| e.with_detail(label()))?;

        let required = |key: &str| string(obj, key, key).map_err(|e| e.with_detail(label()));
        variation.duration_label = Some(required("durationLabel")?);
        variation.version_title = Some(required("versionTitle")?);
        variation.description = Some(required("description")?);
        variation.estimated_duration_text = Some(required("estimatedDurationText")?);

        if variation.hooks.len() != EXPECTED_HOOKS_PER_VARIATION {
            warnings.push(format!(
                "variation {} expected {EXPECTED_HOOKS_PER_VARIATION} hooks, found {}",
                variation.id,
                variation.hooks.len()
            ));
        }
        variations.push(variation);
    }

    Ok(Checked { value: variations, warnings })
}

pub fn image_prompt(value: &Value, expect_analysis: bool) -> Result<Checked<ImagePromptResult>, ShapeError> {
    let obj = object(value, "$")?;
    let generated_image_prompt = string(obj, "generatedImagePrompt", "generatedImagePrompt")?;
    let reference_image_analysis = obj.get("referenceImageAnalysis").and_then(Value::as_str).map(str::to_string);

    let mut warnings = Vec::new();
    if expect_analysis && reference_image_analysis.is_none() {
        warnings.push("reference image analysis was expected but not returned".to_string());
    }
    Ok(Checked {
        value: ImagePromptResult { generated_image_prompt, reference_image_analysis },
        warnings,
    })
}

/// Entries without pixel data are reported individually; the render fails
/// only when nothing usable is left.
pub fn rendered_images(
    images: Vec<RenderedImage>,
    prompt_used: &str,
    reference_analysis: Option<&str>,
) -> Result<Checked<RenderedAds>, ShapeError> {
    if images.is_empty() {
        return Err(ShapeError::field("data").with_detail("no images returned"));
    }

    let mut ads = Vec::new();
    let mut failures = Vec::new();
    let mut warnings = Vec::new();
    for (index, image) in images.into_iter().enumerate() {
        match image.b64_data.filter(|d| !d.is_empty()) {
            Some(data) => ads.push(GeneratedAd {
                id: Uuid::new_v4().to_string(),
                image_url: InlineMedia { mime_type: media::sniff_base64_image(&data), data }.data_url(),
                prompt_used: prompt_used.to_string(),
                reference_analysis: reference_analysis.map(str::to_string),
            }),
            None => {
                let reason = "image entry is missing pixel data".to_string();
                warnings.push(format!("image {index}: {reason}"));
                failures.push(ImageFailure { index, reason });
            }
        }
    }

    if ads.is_empty() {
        return Err(ShapeError::field("data[].b64_json")
            .with_detail(format!("{} image entries returned without pixel data", failures.len())));
    }
    Ok(Checked { value: RenderedAds { ads, failures }, warnings })
}

pub fn extracted_details(value: Value) -> Result<ExtractedProductDetails, ShapeError> {
    if !value.is_object() {
        return Err(ShapeError::field("$").with_detail("expected a JSON object"));
    }
    serde_json::from_value(strip_nulls(value)).map_err(|e| ShapeError::field("$").with_detail(e.to_string()))
}

/// Drops `null` members of an object so serde defaults apply.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

fn script_core(obj: &Map<String, Value>) -> Result<ScriptVariation, ShapeError> {
    Ok(ScriptVariation {
        id: string(obj, "id", "id")?,
        duration_label: None,
        version_title: None,
        description: None,
        hooks: hooks(obj)?,
        body: string(obj, "body", "body")?,
        cta: string(obj, "cta", "cta")?,
        estimated_duration_text: None,
    })
}

fn hooks(obj: &Map<String, Value>) -> Result<Vec<ScriptHook>, ShapeError> {
    let items = obj
        .get("hooks")
        .and_then(Value::as_array)
        .ok_or_else(|| ShapeError::field("hooks"))?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let hook = object(item, "hooks[]")?;
            let field = |key: &str| {
                hook.get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        warn!("🪝 hook {} is missing a string `{}`", index, key);
                        ShapeError::field(format!("hooks[].{key}"))
                    })
            };
            Ok(ScriptHook { id: field("id")?, text: field("text")? })
        })
        .collect()
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ShapeError> {
    value
        .as_object()
        .ok_or_else(|| ShapeError::field(path).with_detail("expected a JSON object"))
}

fn string(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, ShapeError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ShapeError::field(path))
}

fn string_list(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Vec<String>, ShapeError> {
    let items = obj.get(key).and_then(Value::as_array).ok_or_else(|| ShapeError::field(path))?;
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| ShapeError::field(format!("{path}[]"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn variation(id: &str, hooks: usize) -> Value {
        json!({
            "id": id,
            "durationLabel": "20 Seconds",
            "versionTitle": "20-Second Version",
            "description": "With 3 alternative hooks",
            "hooks": (0..hooks).map(|i| json!({"id": format!("h{i}"), "text": format!("hook {i}")})).collect::<Vec<_>>(),
            "body": "Body",
            "cta": "Join now",
            "estimatedDurationText": "Estimated ~20 seconds"
        })
    }

    #[test]
    fn video_analysis_requires_transcription() {
        let value = json!({
            "transcription": "  ",
            "visualSummary": "v",
            "originalScriptAnalysis": {"tone": "t", "structure": "s", "hooks": [], "ctas": []}
        });
        assert_eq!(video_analysis(&value).unwrap_err().field, "transcription");
    }

    #[test]
    fn video_analysis_names_nested_fields() {
        let value = json!({
            "transcription": "hello",
            "visualSummary": "v",
            "originalScriptAnalysis": {"tone": "t", "hooks": [], "ctas": []}
        });
        assert_eq!(video_analysis(&value).unwrap_err().field, "originalScriptAnalysis.structure");

        let value = json!({
            "transcription": "hello",
            "visualSummary": "v",
            "originalScriptAnalysis": {"tone": "t", "structure": "s", "hooks": [1], "ctas": []}
        });
        assert_eq!(video_analysis(&value).unwrap_err().field, "originalScriptAnalysis.hooks[]");
    }

    #[test]
    fn adapted_script_allows_zero_hooks() {
        let script = adapted_script(&json!({"id": "a", "hooks": [], "body": "b", "cta": "c"})).unwrap();
        assert!(script.hooks.is_empty());
        assert_eq!(script.body, "b");
    }

    #[test]
    fn hook_without_id_is_rejected_by_name() {
        let err = adapted_script(&json!({"id": "a", "hooks": [{"text": "hi"}], "body": "b", "cta": "c"})).unwrap_err();
        assert_eq!(err.field, "hooks[].id");

        let err = adapted_script(&json!({"id": "a", "hooks": [{"id": 7, "text": "hi"}], "body": "b", "cta": "c"})).unwrap_err();
        assert_eq!(err.field, "hooks[].id");
    }

    #[test]
    fn fresh_scripts_warn_on_counts() {
        let checked = fresh_scripts(&json!([variation("v20", 3), variation("v30", 2)])).unwrap();
        assert_eq!(checked.value.len(), 2);
        assert_eq!(checked.warnings.len(), 2, "{:?}", checked.warnings);
        assert!(checked.warnings[0].contains("received 2"));
        assert!(checked.warnings[1].contains("v30"));
        assert_eq!(checked.value[0].duration_label.as_deref(), Some("20 Seconds"));
    }

    #[test]
    fn fresh_scripts_require_labels() {
        let mut bad = variation("v45", 3);
        bad.as_object_mut().unwrap().remove("versionTitle");
        let err = fresh_scripts(&json!([variation("v20", 3), bad])).unwrap_err();
        assert_eq!(err.field, "versionTitle");
        assert_eq!(err.detail.as_deref(), Some("variation 2 (v45)"));
    }

    #[test]
    fn fresh_scripts_reject_empty_and_non_arrays() {
        assert!(fresh_scripts(&json!([])).is_err());
        assert!(fresh_scripts(&json!({"id": "x"})).is_err());
    }

    #[test]
    fn image_prompt_analysis_is_optional_but_noted() {
        let checked = image_prompt(&json!({"generatedImagePrompt": "A bold poster"}), true).unwrap();
        assert_eq!(checked.warnings.len(), 1);
        let checked = image_prompt(&json!({"generatedImagePrompt": "A bold poster"}), false).unwrap();
        assert!(checked.warnings.is_empty());
        assert_eq!(image_prompt(&json!({"prompt": "x"}), false).unwrap_err().field, "generatedImagePrompt");
    }

    #[test]
    fn images_without_pixels_are_reported_per_entry() {
        let images = vec![RenderedImage { b64_data: Some("iVBORw0KGgo=".into()) }, RenderedImage { b64_data: None }];
        let checked = rendered_images(images, "prompt", Some("analysis")).unwrap();
        assert_eq!(checked.value.ads.len(), 1);
        assert_eq!(checked.value.failures, vec![ImageFailure { index: 1, reason: "image entry is missing pixel data".into() }]);
        assert!(checked.value.ads[0].image_url.starts_with("data:image/png;base64,"));
        assert_eq!(checked.value.ads[0].reference_analysis.as_deref(), Some("analysis"));
    }

    #[test]
    fn a_lone_image_without_pixels_fails_the_render() {
        let err = rendered_images(vec![RenderedImage { b64_data: None }], "prompt", None).unwrap_err();
        assert_eq!(err.field, "data[].b64_json");
        assert_eq!(rendered_images(vec![], "prompt", None).unwrap_err().field, "data");
    }

    #[test]
    fn extraction_treats_nulls_as_unknown() {
        let details = extracted_details(json!({
            "title": "Growth Lab",
            "fullDescription": null,
            "benefits": ["Speed"],
            "faqs": null,
            "modules": [{"title": "M1", "content": "c", "keywords": null}],
            "sessions": [{"session": "S1", "time": null, "day": null, "description": ["a", "b"]}]
        }))
        .unwrap();
        assert_eq!(details.title.as_deref(), Some("Growth Lab"));
        assert!(details.details.full_description.is_none());
        assert!(details.details.faqs.is_empty());
        assert_eq!(details.details.modules[0].keywords, None);
        assert_eq!(details.benefits, vec!["Speed".to_string()]);
    }
}

//! Tolerant decoding of model output into JSON.

use serde_json::Value;
use thiserror::Error;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    Object,
    Array,
}

#[derive(Debug, Error)]
#[error("response is not valid JSON: {raw_text_preview}")]
pub struct MalformedResponse {
    pub raw_text_preview: String,
}

/// Strips a surrounding code fence, parses, and reconciles object/array shape.
/// Field-level checks are left to the caller.
pub fn parse_response(raw: &str, expected: ExpectedShape) -> Result<Value, MalformedResponse> {
    let text = strip_code_fence(raw.trim());
    let parsed: Value = serde_json::from_str(text).map_err(|_| MalformedResponse {
        raw_text_preview: preview(text),
    })?;

    Ok(match (expected, parsed) {
        (ExpectedShape::Object, Value::Array(mut items)) if items.len() == 1 => items.remove(0),
        (ExpectedShape::Array, object @ Value::Object(_)) => Value::Array(vec![object]),
        (_, value) => value,
    })
}

/// Returns the interior of a ```lang ... ``` block, or the input untouched.
/// A leading word only counts as a language tag when whitespace follows it,
/// so a one-line fence around `true` or `42` keeps its payload.
pub fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```").and_then(|t| t.strip_suffix("```")) else {
        return text;
    };
    let inner = inner.trim();
    if inner.is_empty() {
        return text;
    }
    let tag_len = inner
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(inner.len());
    let after_tag = &inner[tag_len..];
    let body = match after_tag.chars().next() {
        Some(c) if tag_len > 0 && c.is_whitespace() => after_tag.trim(),
        _ => inner,
    };
    if body.is_empty() { inner } else { body }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

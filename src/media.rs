use std::path::Path;

use axum::extract::multipart::Field;
use base64::Engine;
use bytes::Bytes;
use serde::{Serialize, Deserialize};
use thiserror::Error;

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Error)]
#[error("could not read {name}: {reason}")]
pub struct MediaReadError {
    pub name: String,
    pub reason: String,
}

/// Media in the inline form multimodal requests carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineMedia {
    pub mime_type: String,
    pub data: String,
}

impl InlineMedia {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

pub fn encode(bytes: &[u8], mime_type: &str) -> InlineMedia {
    InlineMedia {
        mime_type: mime_type.to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
    }
}

pub async fn encode_file(path: &Path, mime_type: Option<&str>) -> Result<InlineMedia, MediaReadError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| MediaReadError {
        name: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mime = mime_type.map(str::to_string).unwrap_or_else(|| sniff_mime(&bytes));
    Ok(encode(&bytes, &mime))
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self { file_name: file_name.into(), mime_type: mime_type.into(), bytes: bytes.into() }
    }

    pub fn to_inline(&self) -> InlineMedia {
        encode(&self.bytes, &self.mime_type)
    }

    pub fn has_mime_prefix(&self, prefix: &str) -> bool {
        self.mime_type.starts_with(prefix)
    }
}

/// Drains one multipart file field.
pub async fn read_upload(field: Field<'_>) -> Result<Upload, MediaReadError> {
    let file_name = field
        .file_name()
        .or_else(|| field.name())
        .unwrap_or("upload")
        .to_string();
    let declared = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(|e| MediaReadError {
        name: file_name.clone(),
        reason: e.to_string(),
    })?;
    let mime_type = match declared {
        Some(mime) if mime != FALLBACK_MIME => mime,
        _ => sniff_mime(&bytes),
    };
    Ok(Upload { file_name, mime_type, bytes })
}

pub fn sniff_mime(bytes: &[u8]) -> String {
    if bytes.starts_with(b"%PDF") {
        return "application/pdf".to_string();
    }
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_MIME.to_string())
}

/// Sniffs the format of base64 pixel data, defaulting to PNG.
pub fn sniff_base64_image(b64: &str) -> String {
    b64.get(..b64.len().min(64) / 4 * 4)
        .and_then(|head| base64::engine::general_purpose::STANDARD.decode(head).ok())
        .and_then(|bytes| image::guess_format(&bytes).ok())
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|| "image/png".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[test]
    fn encode_produces_standard_base64() {
        let media = encode(b"hello", "text/plain");
        assert_eq!(media.data, "aGVsbG8=");
        assert_eq!(media.data_url(), "data:text/plain;base64,aGVsbG8=");
    }

    #[test]
    fn sniffs_pdf_and_png() {
        assert_eq!(sniff_mime(b"%PDF-1.7 ..."), "application/pdf");
        assert_eq!(sniff_mime(PNG_MAGIC), "image/png");
        assert_eq!(sniff_mime(b"plain"), FALLBACK_MIME);
    }

    #[test]
    fn sniffs_base64_pixels() {
        let b64 = base64::engine::general_purpose::STANDARD.encode(PNG_MAGIC);
        assert_eq!(sniff_base64_image(&b64), "image/png");
        let jpeg = base64::engine::general_purpose::STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]);
        assert_eq!(sniff_base64_image(&jpeg), "image/jpeg");
        assert_eq!(sniff_base64_image("@@@"), "image/png");
    }

    #[tokio::test]
    async fn encode_file_reports_read_failures() {
        let err = encode_file(Path::new("/definitely/not/here.mp4"), Some("video/mp4")).await.unwrap_err();
        assert!(err.name.ends_with("here.mp4"));
    }

    #[tokio::test]
    async fn encode_file_sniffs_when_no_mime_given() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brief.pdf");
        std::fs::write(&path, b"%PDF-1.4 body").unwrap();
        let media = encode_file(&path, None).await.unwrap();
        assert_eq!(media.mime_type, "application/pdf");
    }
}

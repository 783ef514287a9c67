//! Supabase backend: rows through PostgREST, PDFs through Storage.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::{json, Value};
use tracing::{error, info};

use super::{BlobStore, Row, RowStore};
use crate::{config::SupabaseConfig, error::RepositoryError, media::Upload};

#[derive(Clone)]
struct Endpoint {
    client: Client,
    base: Url,
    anon_key: String,
}

impl Endpoint {
    fn new(config: &SupabaseConfig) -> Result<Self, RepositoryError> {
        let base = Url::parse(&config.url)
            .map_err(|e| RepositoryError::backend(format!("invalid SUPABASE_URL {}: {}", config.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(RepositoryError::backend(format!("SUPABASE_URL {} cannot be a base URL", config.url)));
        }
        Ok(Self { client: Client::new(), base, anon_key: config.anon_key.clone() })
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.anon_key).bearer_auth(&self.anon_key)
    }
}

async fn checked(response: Response, what: &str) -> Result<Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("❌ Supabase {} failed: status={} body={}", what, status, body);
    Err(RepositoryError::backend(format!("{} failed: status={} body={}", what, status, body)))
}

async fn rows_of(response: Response) -> Result<Vec<Row>, RepositoryError> {
    let value: Value = response.json().await?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect()),
        Value::Object(row) => Ok(vec![row]),
        other => Err(RepositoryError::backend(format!("unexpected PostgREST payload: {}", other))),
    }
}

/// The product table, via PostgREST.
pub struct SupabaseRows {
    endpoint: Endpoint,
    table: String,
}

impl SupabaseRows {
    pub fn new(config: &SupabaseConfig) -> Result<Self, RepositoryError> {
        Ok(Self { endpoint: Endpoint::new(config)?, table: config.table.clone() })
    }

    fn table_url(&self) -> Url {
        self.endpoint.url(["rest", "v1", self.table.as_str()])
    }

    fn by_id(&self, id: &str) -> Url {
        let mut url = self.table_url();
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));
        url
    }
}

#[async_trait]
impl RowStore for SupabaseRows {
    async fn insert(&self, row: Row) -> Result<Row, RepositoryError> {
        let id = row.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let request = self
            .endpoint
            .client
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(&Value::Array(vec![Value::Object(row)]));
        let response = self.endpoint.authed(request).send().await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(RepositoryError::AlreadyExists(id));
        }
        let response = checked(response, "insert").await?;
        rows_of(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::backend("insert returned no row"))
    }

    async fn update(&self, id: &str, patch: Row) -> Result<Row, RepositoryError> {
        let request = self
            .endpoint
            .client
            .patch(self.by_id(id))
            .header("Prefer", "return=representation")
            .json(&patch);
        let response = checked(self.endpoint.authed(request).send().await?, "update").await?;
        rows_of(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn select(&self, id: &str) -> Result<Option<Row>, RepositoryError> {
        let mut url = self.by_id(id);
        url.query_pairs_mut().append_pair("select", "*");
        let request = self.endpoint.client.get(url);
        let response = checked(self.endpoint.authed(request).send().await?, "select").await?;
        Ok(rows_of(response).await?.into_iter().next())
    }

    async fn select_all(&self) -> Result<Vec<Row>, RepositoryError> {
        let mut url = self.table_url();
        url.query_pairs_mut().append_pair("select", "*").append_pair("order", "title.asc");
        let request = self.endpoint.client.get(url);
        let response = checked(self.endpoint.authed(request).send().await?, "list").await?;
        rows_of(response).await
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let request = self.endpoint.client.delete(self.by_id(id));
        checked(self.endpoint.authed(request).send().await?, "delete").await?;
        Ok(())
    }
}

/// The PDF bucket, via Supabase Storage.
pub struct SupabaseBlobs {
    endpoint: Endpoint,
    bucket: String,
}

impl SupabaseBlobs {
    pub fn new(config: &SupabaseConfig) -> Result<Self, RepositoryError> {
        Ok(Self { endpoint: Endpoint::new(config)?, bucket: config.bucket.clone() })
    }

    fn object_url(&self, public: bool, path: &str) -> Url {
        let prefix: &[&str] = if public { &["storage", "v1", "object", "public"] } else { &["storage", "v1", "object"] };
        self.endpoint.url(
            prefix
                .iter()
                .copied()
                .chain(std::iter::once(self.bucket.as_str()))
                .chain(path.split('/')),
        )
    }
}

#[async_trait]
impl BlobStore for SupabaseBlobs {
    async fn upload(&self, path: &str, upload: &Upload) -> Result<String, RepositoryError> {
        let request = self
            .endpoint
            .client
            .post(self.object_url(false, path))
            .header("x-upsert", "true")
            .header("cache-control", "3600")
            .header("content-type", &upload.mime_type)
            .body(upload.bytes.clone());
        checked(self.endpoint.authed(request).send().await?, "PDF upload").await?;
        Ok(self.object_url(true, path).to_string())
    }

    async fn remove(&self, path: &str) -> Result<bool, RepositoryError> {
        let url = self.endpoint.url(["storage", "v1", "object", self.bucket.as_str()]);
        let request = self.endpoint.client.delete(url).json(&json!({ "prefixes": [path] }));
        let response = self.endpoint.authed(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let removed: Value = checked(response, "PDF delete").await?.json().await?;
        let count = removed.as_array().map_or(0, Vec::len);
        info!("🗑️ Storage removed {} object(s) for {}", count, path);
        Ok(count > 0)
    }

    async fn download(&self, path: &str) -> Result<Option<Bytes>, RepositoryError> {
        let request = self.endpoint.client.get(self.object_url(false, path));
        let response = self.endpoint.authed(request).send().await?;
        // Storage answers a missing object with 400 or 404 depending on version.
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            return Ok(None);
        }
        Ok(Some(checked(response, "PDF download").await?.bytes().await?))
    }
}

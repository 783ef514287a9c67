//! Process-local stores, used when no database is configured and in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::Value;

use super::{BlobStore, Row, RowStore};
use crate::{error::RepositoryError, media::Upload};

#[derive(Default)]
pub struct MemoryRowStore {
    rows: RwLock<HashMap<String, Row>>,
}

fn row_id(row: &Row) -> Result<String, RepositoryError> {
    row.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RepositoryError::backend("row has no id"))
}

fn title(row: &Row) -> &str {
    row.get("title").and_then(Value::as_str).unwrap_or_default()
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn insert(&self, row: Row) -> Result<Row, RepositoryError> {
        let id = row_id(&row)?;
        let mut rows = self.rows.write();
        if rows.contains_key(&id) {
            return Err(RepositoryError::AlreadyExists(id));
        }
        rows.insert(id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: &str, patch: Row) -> Result<Row, RepositoryError> {
        let mut rows = self.rows.write();
        let row = rows.get_mut(id).ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        row.extend(patch);
        Ok(row.clone())
    }

    async fn select(&self, id: &str) -> Result<Option<Row>, RepositoryError> {
        Ok(self.rows.read().get(id).cloned())
    }

    async fn select_all(&self) -> Result<Vec<Row>, RepositoryError> {
        let mut rows: Vec<Row> = self.rows.read().values().cloned().collect();
        rows.sort_by(|a, b| title(a).cmp(title(b)));
        Ok(rows)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.rows.write().remove(id);
        Ok(())
    }
}

pub struct MemoryBlobStore {
    bucket: String,
    blobs: RwLock<HashMap<String, Upload>>,
}

impl MemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), blobs: RwLock::default() }
    }

    #[cfg(test)]
    pub fn blob_count(&self) -> usize {
        self.blobs.read().len()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BUCKET)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, upload: &Upload) -> Result<String, RepositoryError> {
        self.blobs.write().insert(path.to_string(), upload.clone());
        Ok(format!("memory://{}/{}", self.bucket, path))
    }

    async fn remove(&self, path: &str) -> Result<bool, RepositoryError> {
        Ok(self.blobs.write().remove(path).is_some())
    }

    async fn download(&self, path: &str) -> Result<Option<Bytes>, RepositoryError> {
        Ok(self.blobs.read().get(path).map(|u| u.bytes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn update_merges_and_keeps_untouched_columns() {
        let store = MemoryRowStore::default();
        store.insert(row(json!({"id": "a", "title": "A", "createdAt": "then"}))).await.unwrap();
        let updated = store.update("a", row(json!({"title": "A2"}))).await.unwrap();
        assert_eq!(updated.get("createdAt"), Some(&json!("then")));
        assert_eq!(updated.get("title"), Some(&json!("A2")));
        assert!(matches!(store.update("zzz", Row::new()).await, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_and_listing_is_by_title() {
        let store = MemoryRowStore::default();
        store.insert(row(json!({"id": "1", "title": "Zeta"}))).await.unwrap();
        store.insert(row(json!({"id": "2", "title": "Alpha"}))).await.unwrap();
        assert!(matches!(
            store.insert(row(json!({"id": "1", "title": "Again"}))).await,
            Err(RepositoryError::AlreadyExists(id)) if id == "1"
        ));

        let titles: Vec<String> = store
            .select_all()
            .await
            .unwrap()
            .iter()
            .map(|r| title(r).to_string())
            .collect();
        assert_eq!(titles, vec!["Alpha", "Zeta"]);
    }

    #[tokio::test]
    async fn removing_a_missing_blob_reports_false() {
        let blobs = MemoryBlobStore::default();
        let url = blobs.upload("p/x.pdf", &Upload::new("x.pdf", "application/pdf", &b"%PDF"[..])).await.unwrap();
        assert_eq!(url, "memory://workshoppdfs/p/x.pdf");
        assert!(blobs.remove("p/x.pdf").await.unwrap());
        assert!(!blobs.remove("p/x.pdf").await.unwrap());
        assert!(blobs.download("p/x.pdf").await.unwrap().is_none());
    }
}

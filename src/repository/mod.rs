//! Product catalog: one table of rows plus a bucket of PDF attachments.

pub mod columns;
pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    error::RepositoryError,
    media::Upload,
    models::{PdfAttachment, Product, ProductCategory, ProductDraft},
};

pub type Row = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Product>, RepositoryError>;

    /// All products, ordered by title ascending.
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError>;

    async fn create(&self, draft: ProductDraft, pdf: Option<Upload>) -> Result<Product, RepositoryError>;

    /// `previous_blob` is the storage path of the attachment the caller last saw.
    async fn update(
        &self,
        draft: ProductDraft,
        pdf: Option<Upload>,
        previous_blob: Option<String>,
    ) -> Result<Product, RepositoryError>;

    /// Removes the product and its attachment.
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    /// The product's attachment and its bytes. `None` when the product has
    /// no PDF or the blob is gone from storage.
    async fn attachment(&self, id: &str) -> Result<Option<(PdfAttachment, Bytes)>, RepositoryError>;

    /// Deletes every product; returns how many were removed.
    async fn clear_all(&self) -> Result<usize, RepositoryError> {
        let products = self.list_all().await?;
        warn!("🧹 Clearing all {} product(s) and their PDFs", products.len());
        for product in &products {
            self.delete(&product.id).await?;
        }
        Ok(products.len())
    }
}

/// One table of JSON rows keyed by `id`.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn insert(&self, row: Row) -> Result<Row, RepositoryError>;
    /// Merges `patch` into the stored row. Fails with `NotFound` if absent.
    async fn update(&self, id: &str, patch: Row) -> Result<Row, RepositoryError>;
    async fn select(&self, id: &str) -> Result<Option<Row>, RepositoryError>;
    async fn select_all(&self) -> Result<Vec<Row>, RepositoryError>;
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;
}

/// A bucket of files keyed by path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Uploads (overwriting) and returns the public URL.
    async fn upload(&self, path: &str, upload: &Upload) -> Result<String, RepositoryError>;
    /// Returns `false` when nothing was stored at `path`.
    async fn remove(&self, path: &str) -> Result<bool, RepositoryError>;
    async fn download(&self, path: &str) -> Result<Option<Bytes>, RepositoryError>;
}

pub struct Catalog<R, B> {
    rows: R,
    blobs: B,
}

/// `{productId}/{originalFilename}`, with any client-side directories dropped.
pub fn blob_path(product_id: &str, file_name: &str) -> String {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    format!("{}/{}", product_id, name)
}

fn validate(draft: &ProductDraft) -> Result<(String, ProductCategory), RepositoryError> {
    let id = draft.id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    let mut missing = Vec::new();
    if id.is_none() {
        missing.push("id");
    }
    if draft.summary.title.trim().is_empty() {
        missing.push("title");
    }
    if draft.product_category.is_none() {
        missing.push("productCategory");
    }
    match (id, draft.product_category) {
        (Some(id), Some(category)) if missing.is_empty() => Ok((id.to_string(), category)),
        _ => Err(RepositoryError::Validation(missing)),
    }
}

impl<R: RowStore, B: BlobStore> Catalog<R, B> {
    pub fn new(rows: R, blobs: B) -> Self {
        Self { rows, blobs }
    }

    #[cfg(test)]
    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    async fn attach(&self, product_id: &str, upload: &Upload) -> Result<PdfAttachment, RepositoryError> {
        let path = blob_path(product_id, &upload.file_name);
        let download_url = self.blobs.upload(&path, upload).await?;
        info!("📎 Uploaded {} ({} bytes) to {}", upload.file_name, upload.bytes.len(), path);
        Ok(PdfAttachment { original_name: upload.file_name.clone(), storage_path: path, download_url })
    }

    async fn detach(&self, path: &str) -> Result<(), RepositoryError> {
        if self.blobs.remove(path).await? {
            info!("🗑️ Deleted PDF {}", path);
        } else {
            warn!("⚠️ PDF {} was already gone from storage", path);
        }
        Ok(())
    }

    /// Best-effort removal of a blob written by a write that then failed.
    async fn discard(&self, path: &str) {
        if let Err(e) = self.blobs.remove(path).await {
            error!("❌ Could not remove orphaned PDF {}: {}", path, e);
        }
    }

    async fn undo_insert(&self, id: &str) {
        if let Err(e) = self.rows.delete(id).await {
            error!("❌ Could not roll back product {}: {}", id, e);
        }
    }
}

#[async_trait]
impl<R: RowStore, B: BlobStore> ProductRepository for Catalog<R, B> {
    async fn get_by_id(&self, id: &str) -> Result<Option<Product>, RepositoryError> {
        match self.rows.select(id).await? {
            Some(row) => Ok(Some(columns::from_backend(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let mut products = self
            .rows
            .select_all()
            .await?
            .iter()
            .map(columns::from_backend)
            .collect::<Result<Vec<_>, _>>()?;
        products.sort_by(|a, b| a.summary.title.cmp(&b.summary.title));
        Ok(products)
    }

    async fn create(&self, draft: ProductDraft, pdf: Option<Upload>) -> Result<Product, RepositoryError> {
        let (id, product_category) = validate(&draft)?;
        let now = Utc::now();
        let mut product = Product {
            id,
            product_category,
            summary: draft.summary,
            details: draft.details,
            pdf: None,
            created_at: Some(now),
            updated_at: Some(now),
        };

        // The insert claims the id; nothing is uploaded under it before that.
        let stored = self.rows.insert(columns::to_backend(&product)?).await?;
        let Some(upload) = &pdf else {
            info!("✅ Created product '{}' ({})", product.summary.title, product.id);
            return columns::from_backend(&stored);
        };

        let attachment = match self.attach(&product.id, upload).await {
            Ok(attachment) => attachment,
            Err(err) => {
                self.undo_insert(&product.id).await;
                return Err(err);
            }
        };
        let storage_path = attachment.storage_path.clone();
        product.pdf = Some(attachment);

        let mut patch = columns::to_backend(&product)?;
        columns::strip_created_at(&mut patch);
        match self.rows.update(&product.id, patch).await {
            Ok(stored) => {
                info!("✅ Created product '{}' ({}) with PDF {}", product.summary.title, product.id, storage_path);
                columns::from_backend(&stored)
            }
            Err(err) => {
                self.discard(&storage_path).await;
                self.undo_insert(&product.id).await;
                Err(err)
            }
        }
    }

    async fn update(
        &self,
        draft: ProductDraft,
        pdf: Option<Upload>,
        previous_blob: Option<String>,
    ) -> Result<Product, RepositoryError> {
        let (id, product_category) = validate(&draft)?;
        let previous_blob = previous_blob.filter(|p| !p.is_empty());
        let keep_name = draft.pdf_original_name.clone().filter(|n| !n.trim().is_empty());

        let mut product = Product {
            id,
            product_category,
            summary: draft.summary,
            details: draft.details,
            pdf: None,
            created_at: None,
            updated_at: Some(Utc::now()),
        };

        // Blobs are written before the row and removed only after it, so a
        // failure never leaves the row pointing at a missing PDF.
        let mut uploaded = None;
        let mut obsolete = None;
        let mut patch = match (&pdf, &previous_blob, keep_name) {
            (Some(upload), previous, _) => {
                let attachment = self.attach(&product.id, upload).await?;
                uploaded = Some(attachment.storage_path.clone());
                obsolete = previous.clone().filter(|p| *p != attachment.storage_path);
                product.pdf = Some(attachment);
                columns::to_backend(&product)?
            }
            (None, Some(previous), None) => {
                obsolete = Some(previous.clone());
                let mut patch = columns::to_backend(&product)?;
                columns::clear_attachment(&mut patch);
                patch
            }
            (None, _, Some(name)) => {
                let mut patch = columns::to_backend(&product)?;
                if let Some(col) = columns::COLUMNS.iter().find(|c| c.camel == "pdfOriginalName") {
                    patch.insert(col.stored_name().to_string(), serde_json::Value::String(name));
                }
                patch
            }
            (None, None, None) => columns::to_backend(&product)?,
        };
        columns::strip_created_at(&mut patch);

        let stored = match self.rows.update(&product.id, patch).await {
            Ok(stored) => stored,
            Err(err) => {
                if let Some(path) = uploaded.filter(|p| previous_blob.as_ref() != Some(p)) {
                    self.discard(&path).await;
                }
                return Err(err);
            }
        };
        if let Some(previous) = obsolete {
            if let Err(e) = self.detach(&previous).await {
                error!("❌ Product {} updated but old PDF {} was not removed: {}", product.id, previous, e);
            }
        }
        info!("✅ Updated product '{}' ({})", product.summary.title, product.id);
        columns::from_backend(&stored)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let row = self
            .rows
            .select(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        self.rows.delete(id).await?;
        if let Some(path) = columns::storage_path(&row) {
            self.detach(&path).await?;
        }
        info!("🗑️ Deleted product {}", id);
        Ok(())
    }

    async fn attachment(&self, id: &str) -> Result<Option<(PdfAttachment, Bytes)>, RepositoryError> {
        let product = self.get_by_id(id).await?.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        let Some(attachment) = product.pdf else { return Ok(None) };
        match self.blobs.download(&attachment.storage_path).await? {
            Some(bytes) => Ok(Some((attachment, bytes))),
            None => {
                warn!("⚠️ Product {} points at missing PDF {}", id, attachment.storage_path);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductDetails, ProductSummary};
    use memory::{MemoryBlobStore, MemoryRowStore};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn catalog() -> Catalog<MemoryRowStore, MemoryBlobStore> {
        Catalog::new(MemoryRowStore::default(), MemoryBlobStore::default())
    }

    fn draft(id: &str, title: &str) -> ProductDraft {
        ProductDraft {
            id: Some(id.into()),
            product_category: Some(ProductCategory::Workshop),
            summary: ProductSummary { title: title.into(), ..Default::default() },
            ..Default::default()
        }
    }

    fn pdf(name: &str) -> Upload {
        Upload::new(name, "application/pdf", &b"%PDF-1.4"[..])
    }

    /// Memory stores that can be told to fail writes.
    #[derive(Default)]
    struct FlakyRows {
        inner: MemoryRowStore,
        fail_updates: AtomicBool,
    }

    #[async_trait]
    impl RowStore for FlakyRows {
        async fn insert(&self, row: Row) -> Result<Row, RepositoryError> {
            self.inner.insert(row).await
        }
        async fn update(&self, id: &str, patch: Row) -> Result<Row, RepositoryError> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(RepositoryError::backend("table unavailable"));
            }
            self.inner.update(id, patch).await
        }
        async fn select(&self, id: &str) -> Result<Option<Row>, RepositoryError> {
            self.inner.select(id).await
        }
        async fn select_all(&self) -> Result<Vec<Row>, RepositoryError> {
            self.inner.select_all().await
        }
        async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
            self.inner.delete(id).await
        }
    }

    #[derive(Default)]
    struct FlakyBlobs {
        inner: MemoryBlobStore,
        fail_uploads: AtomicBool,
    }

    #[async_trait]
    impl BlobStore for FlakyBlobs {
        async fn upload(&self, path: &str, upload: &Upload) -> Result<String, RepositoryError> {
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(RepositoryError::backend("bucket unavailable"));
            }
            self.inner.upload(path, upload).await
        }
        async fn remove(&self, path: &str) -> Result<bool, RepositoryError> {
            self.inner.remove(path).await
        }
        async fn download(&self, path: &str) -> Result<Option<Bytes>, RepositoryError> {
            self.inner.download(path).await
        }
    }

    fn flaky() -> Catalog<FlakyRows, FlakyBlobs> {
        Catalog::new(FlakyRows::default(), FlakyBlobs::default())
    }

    #[test]
    fn blob_paths_drop_client_directories() {
        assert_eq!(blob_path("p-1", "brief.pdf"), "p-1/brief.pdf");
        assert_eq!(blob_path("p-1", "C:\\docs\\brief.pdf"), "p-1/brief.pdf");
        assert_eq!(blob_path("p-1", "../x/brief.pdf"), "p-1/brief.pdf");
    }

    #[tokio::test]
    async fn missing_mandatory_fields_are_listed() {
        let err = catalog().create(ProductDraft::default(), None).await.unwrap_err();
        match err {
            RepositoryError::Validation(missing) => assert_eq!(missing, vec!["id", "title", "productCategory"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_keeps_created_at_and_clears_removed_fields() {
        let catalog = catalog();
        let mut first = draft("p-1", "Growth Lab");
        first.details = ProductDetails { guarantee: Some("30 days".into()), ..Default::default() };
        let created = catalog.create(first, None).await.unwrap();

        let updated = catalog.update(draft("p-1", "Growth Lab II"), None, None).await.unwrap();
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.summary.title, "Growth Lab II");
        assert!(updated.details.guarantee.is_none());
    }

    #[tokio::test]
    async fn new_pdf_replaces_the_previous_blob() {
        let catalog = catalog();
        let created = catalog.create(draft("p-1", "T"), Some(pdf("old.pdf"))).await.unwrap();
        let old_path = created.pdf.map(|p| p.storage_path);
        assert_eq!(old_path.as_deref(), Some("p-1/old.pdf"));

        let updated = catalog.update(draft("p-1", "T"), Some(pdf("new.pdf")), old_path).await.unwrap();
        assert_eq!(updated.pdf.unwrap().original_name, "new.pdf");
        assert!(catalog.blobs().download("p-1/old.pdf").await.unwrap().is_none());
        assert_eq!(catalog.blobs().blob_count(), 1);
    }

    #[tokio::test]
    async fn clearing_the_attachment_name_deletes_the_blob() {
        let catalog = catalog();
        let created = catalog.create(draft("p-1", "T"), Some(pdf("brief.pdf"))).await.unwrap();
        let path = created.pdf.map(|p| p.storage_path);

        let updated = catalog.update(draft("p-1", "T"), None, path).await.unwrap();
        assert!(updated.pdf.is_none());
        assert_eq!(catalog.blobs().blob_count(), 0);
    }

    #[tokio::test]
    async fn keeping_the_attachment_name_preserves_the_blob() {
        let catalog = catalog();
        let created = catalog.create(draft("p-1", "T"), Some(pdf("brief.pdf"))).await.unwrap();
        let attachment = created.pdf.clone().unwrap();

        let mut keep = draft("p-1", "T2");
        keep.pdf_original_name = Some("brief.pdf".into());
        let updated = catalog.update(keep, None, Some(attachment.storage_path.clone())).await.unwrap();
        assert_eq!(updated.pdf, Some(attachment));
        assert_eq!(catalog.blobs().blob_count(), 1);
    }

    #[tokio::test]
    async fn clear_all_empties_rows_and_bucket() {
        let catalog = catalog();
        catalog.create(draft("a", "A"), Some(pdf("a.pdf"))).await.unwrap();
        catalog.create(draft("b", "B"), None).await.unwrap();

        assert_eq!(catalog.clear_all().await.unwrap(), 2);
        assert!(catalog.list_all().await.unwrap().is_empty());
        assert_eq!(catalog.blobs().blob_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_create_leaves_the_existing_pdf_alone() {
        let catalog = catalog();
        let original = Upload::new("brief.pdf", "application/pdf", &b"%PDF-ORIGINAL"[..]);
        catalog.create(draft("p-1", "Growth Lab"), Some(original)).await.unwrap();

        let intruder = Upload::new("brief.pdf", "application/pdf", &b"%PDF-INTRUDER"[..]);
        let err = catalog.create(draft("p-1", "Other"), Some(intruder)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(id) if id == "p-1"));

        let stored = catalog.blobs().download("p-1/brief.pdf").await.unwrap().unwrap();
        assert_eq!(&stored[..], b"%PDF-ORIGINAL");
        assert_eq!(catalog.get_by_id("p-1").await.unwrap().unwrap().summary.title, "Growth Lab");
    }

    #[tokio::test]
    async fn failed_upload_on_create_leaves_no_row() {
        let catalog = flaky();
        catalog.blobs().fail_uploads.store(true, Ordering::SeqCst);

        assert!(catalog.create(draft("p-1", "T"), Some(pdf("brief.pdf"))).await.is_err());
        assert!(catalog.get_by_id("p-1").await.unwrap().is_none());
        assert_eq!(catalog.blobs().inner.blob_count(), 0);
    }

    #[tokio::test]
    async fn failed_row_write_on_create_removes_the_uploaded_pdf() {
        let catalog = flaky();
        catalog.rows.fail_updates.store(true, Ordering::SeqCst);

        assert!(catalog.create(draft("p-1", "T"), Some(pdf("brief.pdf"))).await.is_err());
        assert!(catalog.get_by_id("p-1").await.unwrap().is_none());
        assert_eq!(catalog.blobs().inner.blob_count(), 0);
    }

    #[tokio::test]
    async fn failed_upload_on_update_keeps_the_previous_pdf() {
        let catalog = flaky();
        let created = catalog.create(draft("p-1", "T"), Some(pdf("old.pdf"))).await.unwrap();
        let old = created.pdf.clone().unwrap();
        catalog.blobs().fail_uploads.store(true, Ordering::SeqCst);

        let result = catalog.update(draft("p-1", "T2"), Some(pdf("new.pdf")), Some(old.storage_path.clone())).await;
        assert!(result.is_err());
        assert!(catalog.blobs().download(&old.storage_path).await.unwrap().is_some());
        let current = catalog.get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(current.pdf, Some(old));
        assert_eq!(current.summary.title, "T");
    }

    #[tokio::test]
    async fn failed_row_write_on_update_keeps_the_previous_pdf_and_drops_the_new_one() {
        let catalog = flaky();
        let created = catalog.create(draft("p-1", "T"), Some(pdf("old.pdf"))).await.unwrap();
        let old = created.pdf.clone().unwrap();
        catalog.rows.fail_updates.store(true, Ordering::SeqCst);

        let result = catalog.update(draft("p-1", "T2"), Some(pdf("new.pdf")), Some(old.storage_path.clone())).await;
        assert!(result.is_err());
        assert!(catalog.blobs().download(&old.storage_path).await.unwrap().is_some());
        assert!(catalog.blobs().download("p-1/new.pdf").await.unwrap().is_none());
        assert_eq!(catalog.get_by_id("p-1").await.unwrap().unwrap().pdf, Some(old));
    }

    #[tokio::test]
    async fn failed_row_write_on_clear_keeps_the_pdf() {
        let catalog = flaky();
        let created = catalog.create(draft("p-1", "T"), Some(pdf("brief.pdf"))).await.unwrap();
        let path = created.pdf.map(|p| p.storage_path);
        catalog.rows.fail_updates.store(true, Ordering::SeqCst);

        assert!(catalog.update(draft("p-1", "T"), None, path.clone()).await.is_err());
        assert_eq!(catalog.blobs().inner.blob_count(), 1);
    }

    #[tokio::test]
    async fn reuploading_the_same_name_keeps_the_new_bytes() {
        let catalog = catalog();
        let created = catalog.create(draft("p-1", "T"), Some(pdf("brief.pdf"))).await.unwrap();
        let path = created.pdf.map(|p| p.storage_path);

        let fresh = Upload::new("brief.pdf", "application/pdf", &b"%PDF-V2"[..]);
        catalog.update(draft("p-1", "T"), Some(fresh), path).await.unwrap();
        let stored = catalog.blobs().download("p-1/brief.pdf").await.unwrap().unwrap();
        assert_eq!(&stored[..], b"%PDF-V2");
    }

    #[tokio::test]
    async fn attachment_returns_the_stored_pdf() {
        let catalog = catalog();
        catalog.create(draft("p-1", "T"), Some(pdf("brief.pdf"))).await.unwrap();
        catalog.create(draft("p-2", "U"), None).await.unwrap();

        let (attachment, bytes) = catalog.attachment("p-1").await.unwrap().unwrap();
        assert_eq!(attachment.original_name, "brief.pdf");
        assert_eq!(&bytes[..], b"%PDF-1.4");
        assert!(catalog.attachment("p-2").await.unwrap().is_none());
        assert!(matches!(catalog.attachment("nope").await, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn deleting_an_unknown_product_is_not_found() {
        assert!(matches!(catalog().delete("nope").await, Err(RepositoryError::NotFound(_))));
    }
}

//! Populates an empty catalog from the workshop documents compiled into the binary.

use include_dir::{include_dir, Dir};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::RepositoryError,
    models::{ProductCategory, ProductDetails, ProductDraft, ProductSummary},
    repository::ProductRepository,
    validate::strip_nulls,
};

static WORKSHOP_DOCS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/workshop_docs");

/// Keys in a bundled document that the catalog assigns itself.
const ASSIGNED_KEYS: [&str; 7] =
    ["id", "productCategory", "createdAt", "updatedAt", "pdfOriginalName", "pdfStoragePath", "pdfDownloadURL"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkshopType {
    Marketing,
    GenAi,
    Engineering,
    Business,
}

impl WorkshopType {
    pub const ALL: [WorkshopType; 4] =
        [WorkshopType::Marketing, WorkshopType::GenAi, WorkshopType::Engineering, WorkshopType::Business];

    pub fn name(self) -> &'static str {
        match self {
            WorkshopType::Marketing => "Marketing Mastermind",
            WorkshopType::GenAi => "GenAI Mastermind",
            WorkshopType::Engineering => "Engineering Mastermind",
            WorkshopType::Business => "Business Mastermind",
        }
    }
}

/// `"GenAI Mastermind"` -> `"genai_mastermind.json"`.
pub fn json_filename(type_name: &str) -> String {
    format!("{}.json", type_name.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_"))
}

fn bundled_draft(workshop: WorkshopType) -> Option<ProductDraft> {
    let filename = json_filename(workshop.name());
    let Some(raw) = WORKSHOP_DOCS.get_file(&filename).and_then(|f| f.contents_utf8()) else {
        warn!("⚠️ Default document {} is not bundled", filename);
        return None;
    };
    let mut doc: Value = match serde_json::from_str(raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("⚠️ Default document {} is not valid JSON: {}", filename, e);
            return None;
        }
    };
    if let Value::Object(map) = &mut doc {
        for key in ASSIGNED_KEYS {
            map.remove(key);
        }
    }
    match serde_json::from_value::<ProductDraft>(strip_nulls(doc)) {
        Ok(draft) => Some(draft),
        Err(e) => {
            warn!("⚠️ Default document {} does not describe a product: {}", filename, e);
            None
        }
    }
}

fn placeholder_draft(workshop: WorkshopType) -> ProductDraft {
    ProductDraft {
        summary: ProductSummary { title: workshop.name().to_string(), ..Default::default() },
        details: ProductDetails {
            full_description: Some(format!("Default content for {}. Please edit.", workshop.name())),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// The draft a default workshop is seeded with, under a fresh id.
pub fn default_draft(workshop: WorkshopType) -> ProductDraft {
    let mut draft = bundled_draft(workshop).unwrap_or_else(|| placeholder_draft(workshop));
    if draft.summary.title.trim().is_empty() {
        draft.summary.title = workshop.name().to_string();
    }
    draft.id = Some(Uuid::new_v4().to_string());
    draft.product_category = Some(ProductCategory::Workshop);
    draft.pdf_original_name = None;
    draft
}

/// Seeds the default workshops when the catalog holds no product at all.
/// Returns the number of products created.
pub async fn seed_if_empty(repository: &dyn ProductRepository) -> Result<usize, RepositoryError> {
    if !repository.list_all().await?.is_empty() {
        return Ok(0);
    }
    info!("🌱 Product catalog is empty, seeding {} default workshops", WorkshopType::ALL.len());
    let mut created = 0;
    for workshop in WorkshopType::ALL {
        let product = repository.create(default_draft(workshop), None).await?;
        info!("🌱 Seeded '{}' ({})", product.summary.title, product.id);
        created += 1;
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        memory::{MemoryBlobStore, MemoryRowStore},
        Catalog,
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn filenames_are_lowercase_with_underscores() {
        assert_eq!(json_filename("Marketing Mastermind"), "marketing_mastermind.json");
        assert_eq!(json_filename("GenAI  Mastermind"), "genai_mastermind.json");
    }

    #[test]
    fn every_workshop_type_has_a_bundled_document() {
        for workshop in WorkshopType::ALL {
            let draft = bundled_draft(workshop);
            assert!(draft.is_some(), "{} missing", workshop.name());
            assert!(!draft.unwrap().summary.benefits.is_empty());
        }
    }

    #[test]
    fn drafts_get_fresh_ids_and_the_workshop_category() {
        let a = default_draft(WorkshopType::GenAi);
        let b = default_draft(WorkshopType::GenAi);
        assert_ne!(a.id, b.id);
        assert_eq!(a.product_category, Some(ProductCategory::Workshop));
        assert_eq!(a.summary.title, "GenAI Mastermind");
    }

    #[test]
    fn placeholder_asks_for_an_edit() {
        let draft = placeholder_draft(WorkshopType::Business);
        assert_eq!(
            draft.details.full_description.as_deref(),
            Some("Default content for Business Mastermind. Please edit.")
        );
    }

    #[tokio::test]
    async fn seeds_once_and_never_a_populated_catalog() {
        let catalog = Catalog::new(MemoryRowStore::default(), MemoryBlobStore::default());
        assert_eq!(seed_if_empty(&catalog).await.unwrap(), 4);
        assert_eq!(seed_if_empty(&catalog).await.unwrap(), 0);

        let titles: Vec<String> = catalog.list_all().await.unwrap().into_iter().map(|p| p.summary.title).collect();
        assert_eq!(
            titles,
            vec!["Business Mastermind", "Engineering Mastermind", "GenAI Mastermind", "Marketing Mastermind"]
        );
    }
}

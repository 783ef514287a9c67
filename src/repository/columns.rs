//! Mapping between the canonical camelCase product fields and the stored
//! column names. Reads accept either naming; writes use the stored one.

use serde_json::Value;

use super::Row;
use crate::{error::RepositoryError, models::Product, validate::strip_nulls};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Naming {
    Camel,
    Snake,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub camel: &'static str,
    pub snake: &'static str,
    write: Naming,
    /// Set by the repository itself; never nulled by a content write.
    managed: bool,
}

impl Column {
    const fn content(camel: &'static str, snake: &'static str) -> Self {
        Self { camel, snake, write: Naming::Camel, managed: false }
    }

    const fn managed(camel: &'static str, snake: &'static str) -> Self {
        Self { camel, snake, write: Naming::Camel, managed: true }
    }

    pub fn stored_name(&self) -> &'static str {
        match self.write {
            Naming::Camel => self.camel,
            Naming::Snake => self.snake,
        }
    }
}

pub const COLUMNS: &[Column] = &[
    Column::content("id", "id"),
    Column { camel: "productCategory", snake: "product_category", write: Naming::Snake, managed: false },
    Column::content("title", "title"),
    Column::content("benefits", "benefits"),
    Column::content("targetAudience", "target_audience"),
    Column::content("sessions", "sessions"),
    Column::content("fullDescription", "full_description"),
    Column::content("learningObjectives", "learning_objectives"),
    Column::content("modules", "modules"),
    Column::content("targetAudienceDeepDive", "target_audience_deep_dive"),
    Column::content("uniqueSellingPointsDetailed", "unique_selling_points_detailed"),
    Column::content("faqs", "faqs"),
    Column::content("mentors", "mentors"),
    Column::content("guarantee", "guarantee"),
    Column::content("certificateInfo", "certificate_info"),
    Column::content("links", "links"),
    Column::content("testimonials", "testimonials"),
    Column::content("registrationLink", "registration_link"),
    Column::content("refundPolicy", "refund_policy"),
    Column::content("price", "price"),
    Column::content("discountDeadline", "discount_deadline"),
    Column::managed("pdfOriginalName", "pdf_original_name"),
    Column::managed("pdfStoragePath", "pdf_storage_path"),
    Column::managed("pdfDownloadURL", "pdf_download_url"),
    Column::managed("createdAt", "created_at"),
    Column::managed("updatedAt", "updated_at"),
];

const ATTACHMENT_COLUMNS: [&str; 3] = ["pdfOriginalName", "pdfStoragePath", "pdfDownloadURL"];

fn column(camel: &str) -> Option<&'static Column> {
    COLUMNS.iter().find(|c| c.camel == camel)
}

fn read<'a>(row: &'a Row, col: &Column) -> Option<&'a Value> {
    row.get(col.snake)
        .filter(|v| !v.is_null())
        .or_else(|| row.get(col.camel))
        .filter(|v| !v.is_null())
}

/// Builds the stored row for `product`. Absent content fields are written as
/// `null` so an update clears them; absent managed fields are left out.
pub fn to_backend(product: &Product) -> Result<Row, RepositoryError> {
    let Value::Object(mut canonical) = serde_json::to_value(product)? else {
        return Err(RepositoryError::backend("product did not serialize to an object"));
    };
    let mut row = Row::new();
    for col in COLUMNS {
        match canonical.remove(col.camel) {
            Some(value) => {
                row.insert(col.stored_name().to_string(), value);
            }
            None if !col.managed => {
                row.insert(col.stored_name().to_string(), Value::Null);
            }
            None => {}
        }
    }
    Ok(row)
}

pub fn from_backend(row: &Row) -> Result<Product, RepositoryError> {
    let canonical: serde_json::Map<String, Value> = COLUMNS
        .iter()
        .filter_map(|col| read(row, col).map(|v| (col.camel.to_string(), v.clone())))
        .collect();
    Ok(serde_json::from_value(strip_nulls(Value::Object(canonical)))?)
}

/// Nulls the three attachment columns.
pub fn clear_attachment(row: &mut Row) {
    for camel in ATTACHMENT_COLUMNS {
        if let Some(col) = column(camel) {
            row.insert(col.stored_name().to_string(), Value::Null);
        }
    }
}

/// Drops the creation timestamp so an update keeps the stored one.
pub fn strip_created_at(row: &mut Row) {
    if let Some(col) = column("createdAt") {
        row.remove(col.stored_name());
    }
}

pub fn storage_path(row: &Row) -> Option<String> {
    column("pdfStoragePath")
        .and_then(|col| read(row, col))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PdfAttachment, ProductCategory, ProductDetails, ProductSummary};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn product() -> Product {
        Product {
            id: "p-1".into(),
            product_category: ProductCategory::Workshop,
            summary: ProductSummary { title: "Growth Lab".into(), benefits: vec!["Speed".into()], ..Default::default() },
            details: ProductDetails { full_description: Some("Long form".into()), ..Default::default() },
            pdf: Some(PdfAttachment {
                original_name: "brief.pdf".into(),
                storage_path: "p-1/brief.pdf".into(),
                download_url: "https://cdn/p-1/brief.pdf".into(),
            }),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn writes_category_snake_case_and_the_rest_camel_case() {
        let stored = to_backend(&product()).unwrap();
        assert_eq!(stored.get("product_category"), Some(&json!("WORKSHOP")));
        assert!(!stored.contains_key("productCategory"));
        assert_eq!(stored.get("fullDescription"), Some(&json!("Long form")));
        assert_eq!(stored.get("pdfDownloadURL"), Some(&json!("https://cdn/p-1/brief.pdf")));
        assert_eq!(stored.get("guarantee"), Some(&Value::Null));
        assert!(!stored.contains_key("createdAt"));
    }

    #[test]
    fn reads_snake_case_rows() {
        let stored = row(json!({
            "id": "p-2",
            "product_category": "IP",
            "title": "Deep Work",
            "target_audience": ["Writers"],
            "full_description": "All about focus",
            "refund_policy": null,
            "pdf_original_name": "deck.pdf",
            "pdf_storage_path": "p-2/deck.pdf",
            "pdf_download_url": "https://cdn/p-2/deck.pdf",
            "created_at": "2024-05-01T10:00:00+00:00",
            "internal_notes": "ignored"
        }));
        let product = from_backend(&stored).unwrap();
        assert_eq!(product.product_category, ProductCategory::Ip);
        assert_eq!(product.summary.target_audience, vec!["Writers".to_string()]);
        assert_eq!(product.details.full_description.as_deref(), Some("All about focus"));
        assert!(product.details.refund_policy.is_none());
        assert!(product.summary.benefits.is_empty());
        assert_eq!(product.pdf.unwrap().storage_path, "p-2/deck.pdf");
        assert!(product.created_at.is_some());
    }

    #[test]
    fn snake_case_wins_over_a_null_camel_case_duplicate() {
        let stored = row(json!({
            "id": "p-3", "product_category": "WORKSHOP", "title": "T",
            "fullDescription": null, "full_description": "kept"
        }));
        assert_eq!(from_backend(&stored).unwrap().details.full_description.as_deref(), Some("kept"));
    }

    #[test]
    fn written_rows_read_back_to_the_same_product() {
        let original = product();
        assert_eq!(from_backend(&to_backend(&original).unwrap()).unwrap(), original);
    }

    #[test]
    fn clearing_the_attachment_nulls_all_three_columns() {
        let mut stored = to_backend(&product()).unwrap();
        clear_attachment(&mut stored);
        assert_eq!(storage_path(&stored), None);
        assert_eq!(stored.get("pdfOriginalName"), Some(&Value::Null));
        assert!(from_backend(&stored).unwrap().pdf.is_none());
    }
}

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    error::{PipelineError, RepositoryError},
    media::{self, Upload},
    models::{AppMode, ExtractedProductDetails, GenerateForm, GenerationRequest, Product, ProductDraft},
    pipeline::{GenerationPipeline, PipelineOutput},
    repository::ProductRepository,
    settings::{SettingsError, SettingsStore, SettingsView, SystemPrompts},
};

/// Videos travel inline, so the default 2 MB body limit is far too small.
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub products: Arc<dyn ProductRepository>,
    pub pipeline: Arc<GenerationPipeline>,
    pub settings: Arc<SettingsStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/products", get(list_products).post(create_product).delete(clear_products))
        .route("/api/products/extract", post(extract_product_details))
        .route("/api/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/api/products/:id/pdf", get(download_pdf))
        .route("/api/generate", post(generate))
        .route("/api/settings", get(get_settings))
        .route("/api/settings/image-key", put(set_image_key))
        .route("/api/settings/prompts", put(set_system_prompts))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Pipeline(PipelineError),
    Repository(RepositoryError),
    Settings(SettingsError),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self { ApiError::Pipeline(err) }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self { ApiError::Repository(err) }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self { ApiError::Settings(err) }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self { ApiError::BadRequest(format!("invalid multipart body: {}", err)) }
}

fn repository_status(err: &RepositoryError) -> (StatusCode, &'static str) {
    match err {
        RepositoryError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        RepositoryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        RepositoryError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
        RepositoryError::Backend(_) | RepositoryError::Mapping(_) => (StatusCode::BAD_GATEWAY, "repository"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Repository(err) => {
                let (status, kind) = repository_status(err);
                (status, kind, err.to_string())
            }
            ApiError::Settings(err) => (StatusCode::INTERNAL_SERVER_ERROR, "settings", err.to_string()),
            ApiError::Pipeline(err) => {
                let status = match err {
                    PipelineError::MediaRead(_) | PipelineError::NoProductSelected | PipelineError::MissingMedia(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    PipelineError::MissingCredential(_) => StatusCode::PRECONDITION_FAILED,
                    PipelineError::ProductNotFound(_) => StatusCode::NOT_FOUND,
                    PipelineError::MalformedResponse { .. }
                    | PipelineError::InvalidResponseShape { .. }
                    | PipelineError::RemoteService { .. } => StatusCode::BAD_GATEWAY,
                    PipelineError::Repository(inner) => repository_status(inner).0,
                };
                (status, err.kind(), err.to_string())
            }
        };
        if status.is_server_error() {
            tracing::error!("❌ {} ({}): {}", status, kind, message);
        } else {
            tracing::warn!("⚠️ {} ({}): {}", status, kind, message);
        }

        let mut body = json!({ "error": message, "kind": kind });
        if let ApiError::Pipeline(PipelineError::RemoteService { service, kind: failure, .. }) = &self {
            body["service"] = json!(service);
            body["failure"] = json!(failure);
        }
        (status, Json(body)).into_response()
    }
}

fn require_mime(upload: &Upload, prefix: &str) -> Result<(), ApiError> {
    if upload.has_mime_prefix(prefix) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "{} has type {}, expected {}*",
            upload.file_name, upload.mime_type, prefix
        )))
    }
}

/// The `product` JSON field plus an optional `pdf` file field.
async fn read_product_form(mut multipart: Multipart) -> Result<(ProductDraft, Option<Upload>), ApiError> {
    let mut draft = None;
    let mut pdf = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("product") => {
                let text = field.text().await?;
                draft = Some(
                    serde_json::from_str::<ProductDraft>(&text)
                        .map_err(|e| ApiError::BadRequest(format!("invalid product JSON: {}", e)))?,
                );
            }
            Some("pdf") => {
                let upload = media::read_upload(field).await.map_err(PipelineError::from)?;
                if !upload.bytes.is_empty() {
                    require_mime(&upload, "application/pdf")?;
                    pdf = Some(upload);
                }
            }
            _ => {}
        }
    }
    let draft = draft.ok_or_else(|| ApiError::BadRequest("missing `product` field".into()))?;
    Ok((draft, pdf))
}

pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.products.list_all().await?))
}

pub async fn get_product(Path(id): Path<String>, State(state): State<AppState>) -> Result<Json<Product>, ApiError> {
    let product = state.products.get_by_id(&id).await?.ok_or(RepositoryError::NotFound(id))?;
    Ok(Json(product))
}

pub async fn create_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let (mut draft, pdf) = read_product_form(multipart).await?;
    if draft.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
        draft.id = Some(Uuid::new_v4().to_string());
    }
    tracing::info!("🎯 Creating product '{}'", draft.summary.title);
    let product = state.products.create(draft, pdf).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    Path(id): Path<String>,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Product>, ApiError> {
    let (mut draft, pdf) = read_product_form(multipart).await?;
    let current = state
        .products
        .get_by_id(&id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
    draft.id = Some(id);
    let previous_blob = current.pdf.map(|p| p.storage_path);

    tracing::info!("🎯 Updating product '{}'", draft.summary.title);
    Ok(Json(state.products.update(draft, pdf, previous_blob).await?))
}

pub async fn delete_product(Path(id): Path<String>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.products.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Streams the stored PDF back, for backends whose public URL is not reachable.
pub async fn download_pdf(Path(id): Path<String>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let (attachment, bytes) = state
        .products
        .attachment(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("product {} has no PDF", id)))?;
    let disposition = format!("inline; filename=\"{}\"", attachment.original_name.replace('"', "_"));
    Ok((
        [(header::CONTENT_TYPE, "application/pdf".to_string()), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response())
}

pub async fn clear_products(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.products.clear_all().await?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn extract_product_details(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractedProductDetails>, ApiError> {
    let mut pdf = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("pdf") {
            pdf = Some(media::read_upload(field).await.map_err(PipelineError::from)?);
        }
    }
    let pdf = pdf.ok_or(PipelineError::MissingMedia("a PDF file is required for extraction"))?;
    require_mime(&pdf, "application/pdf")?;

    tracing::info!("🎯 Extracting product details from {} ({} bytes)", pdf.file_name, pdf.bytes.len());
    let settings = state.settings.snapshot();
    Ok(Json(state.pipeline.extract_product_details(pdf.to_inline(), &settings).await?))
}

/// Multipart body: a `request` JSON field and, in reference mode, a `media` file.
pub async fn generate(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<PipelineOutput>, ApiError> {
    let mut form = None;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("request") => {
                let text = field.text().await?;
                form = Some(
                    serde_json::from_str::<GenerateForm>(&text)
                        .map_err(|e| ApiError::BadRequest(format!("invalid request JSON: {}", e)))?,
                );
            }
            Some("media") => {
                let media = media::read_upload(field).await.map_err(PipelineError::from)?;
                if !media.bytes.is_empty() {
                    upload = Some(media);
                }
            }
            _ => {}
        }
    }
    let form = form.ok_or_else(|| ApiError::BadRequest("missing `request` field".into()))?;

    if let Some(upload) = &upload {
        let expected = match form.mode {
            AppMode::Video => "video/",
            AppMode::Static => "image/",
        };
        require_mime(upload, expected)?;
    }

    let request = GenerationRequest::from_form(form, upload.as_ref().map(Upload::to_inline))?;
    let settings = state.settings.snapshot();
    tracing::info!("🚀 Generation requested for product {}", request.product_id());
    Ok(Json(state.pipeline.run(&request, &settings).await?))
}

pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsView> {
    Json(state.settings.view())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageKeyBody {
    pub api_key: String,
}

pub async fn set_image_key(
    State(state): State<AppState>,
    Json(body): Json<ImageKeyBody>,
) -> Result<Json<SettingsView>, ApiError> {
    state.settings.set_image_api_key(&body.api_key).await?;
    Ok(Json(state.settings.view()))
}

pub async fn set_system_prompts(
    State(state): State<AppState>,
    Json(prompts): Json<SystemPrompts>,
) -> Result<Json<SettingsView>, ApiError> {
    state.settings.set_system_prompts(prompts).await?;
    Ok(Json(state.settings.view()))
}

mod config;
mod error;
mod gemini;
mod media;
mod models;
mod openai;
mod parser;
mod pipeline;
mod prompts;
mod remote;
mod repository;
mod routes;
mod seed;
mod settings;
mod validate;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::AppConfig,
    gemini::GeminiClient,
    openai::OpenAiImageClient,
    pipeline::GenerationPipeline,
    repository::{
        memory::{MemoryBlobStore, MemoryRowStore},
        supabase::{SupabaseBlobs, SupabaseRows},
        Catalog, ProductRepository,
    },
    routes::AppState,
    settings::SettingsStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env();

    // `ad_studio extract <file.pdf>` prints the fields recovered from a local PDF.
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => {}
        [command, path] if command == "extract" => return extract_from_file(&config, Path::new(path)).await,
        _ => anyhow::bail!("usage: ad_studio [extract <file.pdf>]"),
    }

    let products: Arc<dyn ProductRepository> = match &config.supabase {
        Some(supabase) => {
            tracing::info!("🗄️ Using Supabase at {} (table {}, bucket {})", supabase.url, supabase.table, supabase.bucket);
            Arc::new(Catalog::new(SupabaseRows::new(supabase)?, SupabaseBlobs::new(supabase)?))
        }
        None => {
            tracing::warn!("⚠️ SUPABASE_URL / SUPABASE_ANON_KEY not set; products are kept in memory only");
            Arc::new(Catalog::new(MemoryRowStore::default(), MemoryBlobStore::default()))
        }
    };

    match seed::seed_if_empty(products.as_ref()).await {
        Ok(0) => {}
        Ok(n) => tracing::info!("🌱 Seeded {} default products", n),
        Err(e) => tracing::error!("❌ Could not seed the product catalog: {}", e),
    }

    let settings = SettingsStore::load(&config.settings_path, config.gemini_api_key.clone(), config.openai_api_key.clone())
        .with_context(|| format!("loading settings from {}", config.settings_path.display()))?;
    tracing::info!("⚙️ Settings file: {}", settings.path().display());

    let pipeline = GenerationPipeline::new(
        products.clone(),
        Arc::new(GeminiClient::new(config.gemini_api_base.clone())),
        Arc::new(OpenAiImageClient::new(config.openai_api_base.clone())),
        config.models.clone(),
    );

    let state = AppState {
        products,
        pipeline: Arc::new(pipeline),
        settings: Arc::new(settings),
    };
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("👋 Server stopped");
    Ok(())
}

async fn extract_from_file(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let pdf = media::encode_file(path, None).await?;
    if pdf.mime_type != "application/pdf" {
        anyhow::bail!("{} is {}, not a PDF", path.display(), pdf.mime_type);
    }
    let settings = SettingsStore::load(&config.settings_path, config.gemini_api_key.clone(), config.openai_api_key.clone())
        .with_context(|| format!("loading settings from {}", config.settings_path.display()))?;
    let pipeline = GenerationPipeline::new(
        Arc::new(Catalog::new(MemoryRowStore::default(), MemoryBlobStore::default())),
        Arc::new(GeminiClient::new(config.gemini_api_base.clone())),
        Arc::new(OpenAiImageClient::new(config.openai_api_base.clone())),
        config.models.clone(),
    );
    let details = pipeline.extract_product_details(pdf, &settings.snapshot()).await?;
    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 Shutdown requested");
}

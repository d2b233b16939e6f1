//! Main entry point for the image arena server

use image_arena::{
    api,
    arena::{autogen::AutogenScheduler, ArenaService},
    backend::registry::build_backends,
    config::Settings,
    gateway::{build_strategy, Orchestrator},
    storage::{file::FileImageStorage, ImageStorage},
    store::{self, GenerationLock},
    AppState,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env file: {}", e);
        }
    }

    let settings = Settings::load()?;
    init_tracing(&settings);

    info!(
        host = %settings.server.host,
        port = settings.server.port,
        providers = settings.providers.len(),
        "Starting image arena"
    );

    let file_storage = FileImageStorage::new(&settings.storage.base_path, &settings.storage.url_prefix);
    file_storage.ensure_storage_dir().await?;
    let image_storage: Arc<dyn ImageStorage> = Arc::new(file_storage);

    let orchestrator = Arc::new(Orchestrator::new(build_strategy(settings.selection)));
    for backend in build_backends(&settings.providers, image_storage)? {
        orchestrator.register(backend);
    }
    if orchestrator.available_count() == 0 {
        warn!("No image providers are available; generation requests will fail");
    }

    let kv_store = store::connect(&settings.store).await?;
    let arena = ArenaService::new(orchestrator.clone(), kv_store.clone(), &settings.arena);

    let scheduler = if settings.autogen.enabled {
        let scheduler = AutogenScheduler::new(
            arena.clone(),
            GenerationLock::new(kv_store),
            settings.autogen.clone(),
        );
        scheduler.start().await;
        Some(scheduler)
    } else {
        None
    };

    let settings = Arc::new(settings);
    let state = Arc::new(AppState::new(settings.clone(), arena));
    let app = api::create_router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    info!("Server stopped");

    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "pretty" {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

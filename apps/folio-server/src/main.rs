//! Folio Server
//!
//! Book ingestion service: accepts uploads, extracts and normalizes their
//! text in a background worker, and serves the resulting assets.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_server::config::Config;
use folio_server::extraction::{CancelToken, ExtractorRegistry};
use folio_server::formats::djvu::CliDjvuToolkit;
use folio_server::ocr::OcrService;
use folio_server::state::AppState;
use folio_server::worker::IngestionWorker;
use folio_server::{db, routes, search, storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Folio Server v{}", env!("CARGO_PKG_VERSION"));

    // Initialize blob storage
    let store = storage::open(&config.storage)
        .await
        .context("Failed to initialize blob storage")?;

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    let indexer = search::open(&config.search, &db_pool)
        .await
        .context("Failed to initialize search indexer")?;

    // Extraction stack
    let ocr = Arc::new(OcrService::new(config.ocr.clone()));
    if config.extraction.ocr_enabled && !ocr.is_available().await {
        tracing::warn!("OCR is enabled but no provider is available");
    }
    let registry = Arc::new(ExtractorRegistry::new(ocr, Arc::new(CliDjvuToolkit::default())));

    // Start the ingestion worker
    let shutdown = CancelToken::new();
    let worker = Arc::new(IngestionWorker::new(
        db_pool.clone(),
        store.clone(),
        registry,
        indexer,
        &config,
    ));
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app_state = AppState::new(store, db_pool);
    let app = routes::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server with graceful shutdown
    let host: std::net::IpAddr = config.server.host.parse().unwrap_or([0, 0, 0, 0].into());
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Folio Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let the worker settle its current job
    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!("Ingestion worker panicked: {}", e);
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

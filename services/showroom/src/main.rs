use anyhow::{Context, Result};
use atelier_showroom::config::Config;
use atelier_showroom::media::HttpUrlProbe;
use atelier_showroom::{
    start_api_server, AppState, Catalog, MediaResolver, PgDocumentStore, S3FileStore,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Atelier showroom service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let document_store = PgDocumentStore::new(&config.database)
        .await
        .context("Failed to initialize document store")?;

    // Run migrations if enabled
    if config.database.run_migrations {
        document_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let file_store = Arc::new(S3FileStore::new(&config.storage).await);
    if !file_store.ping().await {
        error!(bucket = %config.storage.bucket, "Media bucket is not reachable");
    }

    let probe = HttpUrlProbe::new(config.media.clone())
        .context("Failed to initialize media URL probe")?;

    let catalog = Arc::new(Catalog::new(
        Arc::new(document_store),
        file_store.clone(),
        &config.collections,
    ));
    let media = MediaResolver::new(file_store, Arc::new(probe), config.media.clone());

    // Create API state
    let api_state = AppState::new(catalog, media, config.auth.clone());

    // Spawn API server task
    let shutdown = CancellationToken::new();
    let api_config = config.api.clone();
    let server_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config, server_shutdown).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Showroom service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down showroom service");

    // Let in-flight requests finish
    shutdown.cancel();
    if let Err(e) = api_handle.await {
        error!(error = %e, "API server task failed");
    }

    info!("Showroom service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

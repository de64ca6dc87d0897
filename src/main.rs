use anyhow::{Context, Result};
use listings_service::api::{start_api_server, AppState};
use listings_service::{
    connect_pool, run_migrations, AssociationSynchronizer, Config, ListingStore, LookupStore,
    MediaLibrary, MediaStore,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting listings service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize database
    let pool = connect_pool(&config.database)
        .await
        .context("Failed to initialize database pool")?;

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
    }

    // Initialize components
    let lookups = LookupStore::new(pool.clone());
    let listings = ListingStore::new(pool.clone());
    let sync = AssociationSynchronizer::new(pool.clone(), lookups.clone());

    let media: Option<Arc<dyn MediaStore>> = config
        .media
        .clone()
        .map(|media_config| Arc::new(MediaLibrary::new(media_config)) as Arc<dyn MediaStore>);

    if media.is_none() {
        warn!("Media host credentials not configured; inline image uploads are disabled");
    }

    // Create API state
    let state = AppState {
        listings,
        lookups,
        sync,
        media,
        delivery_host_suffix: config.delivery_host_suffix(),
        admin_secret: config.admin.secret.clone(),
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Listings service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down listings service");

    api_handle.abort();

    info!("Listings service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

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

//! frps-auth - Entry point.

use anyhow::{Context, Result};
use frps_auth::{
    api::{create_router_with_rate_limit, AdminGate, AppState, RateLimitState},
    config::{Config, LogConfig},
    open_store, Signer,
};
use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    init_logging(&config.log)?;

    info!("Starting frps-auth");

    let signer = Arc::new(
        Signer::new(&config.signing.salt)
            .map_err(|e| anyhow::anyhow!("Failed to initialize signer: {}", e))?,
    );

    // Initialize storage
    let store = open_store(&config.storage).context("Failed to open record store")?;
    info!("Loaded store with {} records", store.count()?);

    let state = AppState::new(store.clone(), signer);

    let addr = config.bind_address();
    let admin = config.admin;
    let gate = AdminGate::new(admin.username, admin.password, admin.open_handshake);
    if gate.is_disabled() {
        info!("Administrator credentials are empty, credential gate disabled");
    }

    // Create rate limiter from config
    let rate_limit = RateLimitState::new(config.rate_limit.per_minute);

    let app = create_router_with_rate_limit(state, gate, rate_limit, &config.static_files.dir)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.read_timeout_secs,
        )));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down, flushing record store");
    if let Err(e) = store.flush() {
        error!("Failed to flush record store: {}", e);
    }

    Ok(())
}

/// Install the stderr logger and, when configured, an additional file logger.
fn init_logging(log: &LogConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let file_layer = match &log.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

//! Quire Micropub Kernel
//!
//! HTTP server for the micropub endpoint.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use quire_kernel::{AppState, Config, build_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Quire micropub kernel");

    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        port = config.port,
        site_config = %config.site_config.display(),
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).context("failed to initialize application state")?;

    let app = build_router(state, &config.micropub_path);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, path = %config.micropub_path, "Server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

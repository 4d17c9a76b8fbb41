//! Visavis Server - Main Entry Point
//!
//! Signaling backend for SFU-based multi-party video meetings.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use vv_server::engine::{MediaEngine, RemoteEngine, StubEngine};
use vv_server::{api, config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vv_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Visavis Server"
    );

    // Initialize the media engine: RPC client against the configured worker,
    // or the in-process stub when none is configured.
    let engine: Arc<dyn MediaEngine> = match &config.media_engine_url {
        Some(url) => {
            let remote = Arc::new(RemoteEngine::new(
                url,
                Duration::from_secs(config.engine_timeout_secs),
            )?);
            remote.spawn_handshake();
            info!(url = %url, "Media engine client initialized");
            remote
        }
        None => {
            tracing::warn!(
                "VV_MEDIA_ENGINE_URL not set, using the in-process stub engine. \
                 Signaling will negotiate but no media will flow."
            );
            Arc::new(StubEngine::new())
        }
    };

    // Build application state
    let state = api::AppState::new(config.clone(), engine);

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    info!("Server shutdown complete");

    Ok(())
}

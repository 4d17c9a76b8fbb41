//! API Router and Application State
//!
//! Central routing configuration and shared state.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::Config, engine::MediaEngine, room::RoomRegistry, signaling};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Media engine the signaling layer negotiates against
    pub engine: Arc<dyn MediaEngine>,
    /// Live rooms
    pub rooms: Arc<RoomRegistry>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(config: Config, engine: Arc<dyn MediaEngine>) -> Self {
        let rooms = Arc::new(RoomRegistry::new(Duration::from_secs(
            config.room_linger_secs,
        )));
        Self {
            config: Arc::new(config),
            engine,
            rooms,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // REST signaling fallback
        .nest("/api", signaling::http::router())
        // WebSocket signaling
        .route("/ws", get(signaling::ws_handler))
        // API documentation
        .merge(api_docs())
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        // State
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Whether the media engine has completed its handshake
    engine_ready: bool,
    /// Number of live rooms
    rooms: usize,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        engine_ready: state.engine.router_capabilities().await.is_ok(),
        rooms: state.rooms.room_count().await,
    })
}

/// API documentation routes.
fn api_docs() -> Router<AppState> {
    // TODO: Setup utoipa swagger-ui
    Router::new()
}

//! HTTP router setup
//!
//! Sets up the Axum router with the control endpoints and the SSE stream.

use crate::state::SharedState;
use crate::supervisor::StreamSupervisor;
use axum::{
    routing::{get, post, put},
    Router,
};
use loopcast_common::config::SessionSettings;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub supervisor: Arc<StreamSupervisor>,
    pub state: Arc<SharedState>,
    /// Persisted session settings, replaceable through the API
    pub settings: Arc<RwLock<SessionSettings>>,
    pub settings_path: Arc<PathBuf>,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/stream/start", post(super::handlers::start_stream))
        .route("/stream/stop", post(super::handlers::stop_stream))
        .route("/stream/status", get(super::handlers::get_status))
        .route("/settings", get(super::handlers::get_settings))
        .route("/settings", put(super::handlers::put_settings))
        .route("/events", get(super::sse::event_stream))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

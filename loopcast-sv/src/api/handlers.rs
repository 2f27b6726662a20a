//! HTTP request handlers
//!
//! Implements the control endpoints. Handlers never block on streaming
//! work: `start` validates and hands off to the supervisor task, `stop`
//! only flips the run flag.

use crate::api::server::AppContext;
use crate::supervisor::EncodingProfile;
use axum::{extract::State, http::StatusCode, Json};
use loopcast_common::config::SessionSettings;
use loopcast_common::{Error, SupervisorStatus};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct StartRequest {
    /// Override for the persisted source path
    pub source: Option<String>,
    /// Override for the persisted endpoint base URL
    pub endpoint_base: Option<String>,
    /// Override for the persisted stream key
    pub stream_key: Option<String>,
    /// Encoding profile; defaults to horizontal 720p
    pub profile: Option<EncodingProfile>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    status: String,
    session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StreamStatusResponse {
    status: SupervisorStatus,
    session_id: Option<Uuid>,
    current_item: Option<String>,
    restart_count: u32,
}

type HandlerError = (StatusCode, Json<StatusResponse>);

fn error_response(code: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        code,
        Json(StatusResponse {
            status: message.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "stream_supervisor".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /stream/start - Start a streaming session
///
/// Request fields override the persisted settings; anything omitted falls
/// back to the stored record.
pub async fn start_stream(
    State(ctx): State<AppContext>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, HandlerError> {
    let stored = ctx.settings.read().await.clone();
    let merged = SessionSettings {
        source: request.source.unwrap_or(stored.source),
        endpoint_base: request.endpoint_base.unwrap_or(stored.endpoint_base),
        stream_key: request.stream_key.unwrap_or(stored.stream_key),
    };
    let profile = request.profile.unwrap_or_default();

    match ctx.supervisor.start(&merged, profile).await {
        Ok(session_id) => {
            info!(%session_id, "Stream session started");
            Ok(Json(StartResponse {
                status: "started".to_string(),
                session_id,
            }))
        }
        Err(Error::Validation(message)) => {
            info!("Start rejected: {}", message);
            Err(error_response(StatusCode::BAD_REQUEST, message))
        }
        Err(Error::SessionActive) => Err(error_response(
            StatusCode::CONFLICT,
            Error::SessionActive.to_string(),
        )),
        Err(e) => {
            error!("Failed to start stream: {}", e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("error: {}", e),
            ))
        }
    }
}

/// POST /stream/stop - Stop the active session
///
/// Idempotent; returns 200 even when nothing is running.
pub async fn stop_stream(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.supervisor.stop().await;
    Json(StatusResponse {
        status: "stopping".to_string(),
    })
}

/// GET /stream/status - Current supervisor status
pub async fn get_status(State(ctx): State<AppContext>) -> Json<StreamStatusResponse> {
    Json(StreamStatusResponse {
        status: ctx.state.status().await,
        session_id: ctx.state.session_id().await,
        current_item: ctx.state.current_item().await,
        restart_count: ctx.state.restart_count(),
    })
}

/// GET /settings - Read the persisted session settings
pub async fn get_settings(State(ctx): State<AppContext>) -> Json<SessionSettings> {
    Json(ctx.settings.read().await.clone())
}

/// PUT /settings - Replace and persist the session settings
pub async fn put_settings(
    State(ctx): State<AppContext>,
    Json(new_settings): Json<SessionSettings>,
) -> Result<Json<SessionSettings>, HandlerError> {
    if let Err(e) = new_settings.save(&ctx.settings_path) {
        error!("Failed to save settings: {}", e);
        return Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("error: {}", e),
        ));
    }
    *ctx.settings.write().await = new_settings.clone();
    info!("Settings saved to {}", ctx.settings_path.display());
    Ok(Json(new_settings))
}

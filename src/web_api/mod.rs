//! WebAPI - Control surface
//!
//! ## Responsibilities
//!
//! - HTTP routes for the mode, playback and camera controls
//! - WebSocket stream of render commands
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let backend_ok = state.backend.health_check().await;
    let mode = match state.controller.snapshot().await {
        Ok(snapshot) => snapshot.mode,
        Err(_) => state.hub.surface().await.active_mode.unwrap_or_default(),
    };

    let response = HealthResponse {
        status: if state.controller.is_running() {
            "ok".to_string()
        } else {
            "stopped".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode,
        backend_connected: backend_ok,
        viewers: state.hub.connection_count(),
    };

    Json(response)
}

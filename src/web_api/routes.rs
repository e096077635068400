//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;

use crate::error::{Error, Result};
use crate::frame_capture::encode_jpeg;
use crate::mode_controller::ControllerSnapshot;
use crate::models::{ApiResponse, TrackingMode};
use crate::playback_session::PlaybackAction;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(get_status))
        // Mode selection
        .route("/api/mode/:mode", post(set_mode))
        // Playback controls
        .route("/api/playback/:action", post(playback_action))
        .route("/api/playback/seek/:frame", post(seek))
        // Camera
        .route("/api/camera/retry", post(retry_camera))
        // Output
        .route("/api/output", get(get_output))
        .route("/api/preview", get(get_preview))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Status
// ========================================

async fn get_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let controller = state.controller.snapshot().await?;
    let surface = state.hub.surface().await;

    Ok(Json(ApiResponse::success(json!({
        "controller": controller,
        "surface": surface,
        "viewers": state.hub.connection_count(),
    }))))
}

// ========================================
// Controls
// ========================================

/// POST /api/mode/:mode
async fn set_mode(
    State(state): State<AppState>,
    Path(mode): Path<String>,
) -> Result<Json<ApiResponse<ControllerSnapshot>>> {
    let mode: TrackingMode = mode.parse()?;
    let snapshot = state.controller.set_mode(mode).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

/// POST /api/playback/:action
async fn playback_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<ApiResponse<ControllerSnapshot>>> {
    let action: PlaybackAction = action.parse()?;
    let snapshot = state.controller.playback(action).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

/// POST /api/playback/seek/:frame
async fn seek(
    State(state): State<AppState>,
    Path(frame): Path<i64>,
) -> Result<Json<ApiResponse<ControllerSnapshot>>> {
    let snapshot = state.controller.seek(frame).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

/// POST /api/camera/retry
async fn retry_camera(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ControllerSnapshot>>> {
    let snapshot = state.controller.retry_camera().await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

/// GET /api/output - latest displayed image
async fn get_output(State(state): State<AppState>) -> Response {
    match state.hub.latest_output().await {
        Some(output) => (
            [
                (header::CONTENT_TYPE, output.mime),
                (header::CACHE_CONTROL, "no-store".to_string()),
            ],
            output.data.as_ref().clone(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error("No output displayed yet")),
        )
            .into_response(),
    }
}

/// GET /api/preview - latest camera frame as JPEG
async fn get_preview(State(state): State<AppState>) -> Result<Response> {
    let Some(frame) = state.controller.preview_frame().await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error("No live preview available")),
        )
            .into_response());
    };

    let quality = state.config.jpeg_quality;
    let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
        .await
        .map_err(|e| Error::Internal(format!("Encoder task failed: {}", e)))??;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        jpeg,
    )
        .into_response())
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut rx) = state.hub.register().await;

    // Bring the new viewer up to date; live commands queue in rx meanwhile
    for command in state.hub.replay_commands().await {
        let text = match serde_json::to_string(&command) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize replay command");
                continue;
            }
        };
        if sender.send(Message::Text(text)).await.is_err() {
            state.hub.unregister(&conn_id).await;
            return;
        }
    }

    // Forward render commands from hub to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Viewers only listen; inbound frames are drained for close/ping
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Ping(data)) => {
                    tracing::trace!("Received ping: {:?}", data);
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        conn_id
    });

    let conn_id = tokio::select! {
        _ = send_task => conn_id,
        result = recv_task => result.unwrap_or(conn_id),
    };

    state.hub.unregister(&conn_id).await;
}

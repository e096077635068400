//! DisplayHub - UI surface state and WebSocket distribution
//!
//! ## Responsibilities
//!
//! - Hold the current rendered surface (status text, visible panels,
//!   scrub position, play state, latest output image)
//! - Broadcast every render command to connected viewers
//!
//! Render commands are JSON `{"type": ..., "data": ...}` messages. Output
//! images travel base64 encoded; the raw bytes of the latest output are also
//! kept for `GET /api/output`.

use crate::models::TrackingMode;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Play button labels
pub const PLAY_LABEL: &str = "▶️ Play";
pub const PAUSE_LABEL: &str = "⏸️ Pause";

/// Render command types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum RenderCommand {
    /// Status text surface
    Status(String),
    /// Highlight the selected mode control
    ActiveMode(TrackingMode),
    /// Live preview visibility
    LivePreview(bool),
    /// Playback controls visibility
    PlaybackControls(bool),
    /// Replace the output display
    OutputFrame(OutputFrameMessage),
    /// Scrub control position
    ScrubPosition(ScrubPositionMessage),
    /// Play/pause control state
    PlayState(PlayStateMessage),
}

impl RenderCommand {
    fn kind(&self) -> &'static str {
        match self {
            RenderCommand::Status(_) => "status",
            RenderCommand::ActiveMode(_) => "active_mode",
            RenderCommand::LivePreview(_) => "live_preview",
            RenderCommand::PlaybackControls(_) => "playback_controls",
            RenderCommand::OutputFrame(_) => "output_frame",
            RenderCommand::ScrubPosition(_) => "scrub_position",
            RenderCommand::PlayState(_) => "play_state",
        }
    }
}

/// Where a displayed output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSource {
    /// Processed live camera sample
    Live,
    /// Precomputed playback frame
    Playback,
}

/// Output image message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFrameMessage {
    pub source: FrameSource,
    /// Backend mode the live sample was processed with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<TrackingMode>,
    /// Playback frame index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<usize>,
    pub mime: String,
    /// Base64 encoded image
    pub data: String,
    pub timestamp: String,
}

/// Scrub position message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubPositionMessage {
    pub frame: usize,
    pub total_frames: usize,
}

/// Play state message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayStateMessage {
    pub playing: bool,
    pub label: String,
}

impl PlayStateMessage {
    pub fn new(playing: bool) -> Self {
        Self {
            playing,
            label: if playing { PAUSE_LABEL } else { PLAY_LABEL }.to_string(),
        }
    }
}

/// Current rendered surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceState {
    pub active_mode: Option<TrackingMode>,
    pub status: String,
    pub live_preview_visible: bool,
    pub playback_controls_visible: bool,
    pub scrub: Option<ScrubPositionMessage>,
    pub play_state: PlayStateMessage,
    pub output_source: Option<FrameSource>,
    pub output_mode: Option<TrackingMode>,
    pub output_frame_index: Option<usize>,
    pub output_updated_at: Option<DateTime<Utc>>,
    /// Number of output images presented so far
    pub outputs_presented: u64,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            active_mode: None,
            status: "Select a mode to begin. Marker / Markerless will use your webcam.".to_string(),
            live_preview_visible: true,
            playback_controls_visible: false,
            scrub: None,
            play_state: PlayStateMessage::new(false),
            output_source: None,
            output_mode: None,
            output_frame_index: None,
            output_updated_at: None,
            outputs_presented: 0,
        }
    }
}

/// Latest output image bytes
#[derive(Debug, Clone)]
pub struct OutputImage {
    pub mime: String,
    pub data: Arc<Vec<u8>>,
}

/// Viewer connection
struct ViewerConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// DisplayHub instance
pub struct DisplayHub {
    connections: RwLock<HashMap<Uuid, ViewerConnection>>,
    connection_count: AtomicU64,
    surface: RwLock<SurfaceState>,
    latest_output: RwLock<Option<OutputImage>>,
}

impl DisplayHub {
    /// Create new DisplayHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
            surface: RwLock::new(SurfaceState::default()),
            latest_output: RwLock::new(None),
        }
    }

    /// Register a new viewer
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, ViewerConnection { id, tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Viewer connected");

        (id, rx)
    }

    /// Unregister a viewer
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Viewer disconnected");
        }
    }

    /// Apply a render command to the surface and broadcast it
    pub async fn render(&self, command: RenderCommand) {
        {
            let mut surface = self.surface.write().await;
            match &command {
                RenderCommand::Status(text) => surface.status = text.clone(),
                RenderCommand::ActiveMode(mode) => surface.active_mode = Some(*mode),
                RenderCommand::LivePreview(visible) => surface.live_preview_visible = *visible,
                RenderCommand::PlaybackControls(visible) => {
                    surface.playback_controls_visible = *visible
                }
                RenderCommand::OutputFrame(frame) => {
                    surface.output_source = Some(frame.source);
                    surface.output_mode = frame.mode;
                    surface.output_frame_index = frame.frame_index;
                    surface.output_updated_at = Some(Utc::now());
                    surface.outputs_presented += 1;
                }
                RenderCommand::ScrubPosition(scrub) => surface.scrub = Some(*scrub),
                RenderCommand::PlayState(state) => surface.play_state = state.clone(),
            }
        }

        self.broadcast(&command).await;
    }

    /// Replace the output display with a new image
    pub async fn present_output(
        &self,
        source: FrameSource,
        mode: Option<TrackingMode>,
        frame_index: Option<usize>,
        data: Vec<u8>,
    ) {
        let mime = sniff_mime(&data);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);

        {
            let mut latest = self.latest_output.write().await;
            *latest = Some(OutputImage {
                mime: mime.clone(),
                data: Arc::new(data),
            });
        }

        self.render(RenderCommand::OutputFrame(OutputFrameMessage {
            source,
            mode,
            frame_index,
            mime,
            data: encoded,
            timestamp: Utc::now().to_rfc3339(),
        }))
        .await;
    }

    pub async fn set_status(&self, text: impl Into<String>) {
        self.render(RenderCommand::Status(text.into())).await;
    }

    /// Current surface snapshot
    pub async fn surface(&self) -> SurfaceState {
        self.surface.read().await.clone()
    }

    /// Latest output image, if any
    pub async fn latest_output(&self) -> Option<OutputImage> {
        self.latest_output.read().await.clone()
    }

    /// Commands that rebuild the current surface on a fresh viewer
    pub async fn replay_commands(&self) -> Vec<RenderCommand> {
        let surface = self.surface().await;
        let mut commands = Vec::new();

        if let Some(mode) = surface.active_mode {
            commands.push(RenderCommand::ActiveMode(mode));
        }
        commands.push(RenderCommand::LivePreview(surface.live_preview_visible));
        commands.push(RenderCommand::PlaybackControls(
            surface.playback_controls_visible,
        ));
        if let Some(scrub) = surface.scrub {
            commands.push(RenderCommand::ScrubPosition(scrub));
        }
        commands.push(RenderCommand::PlayState(surface.play_state));
        commands.push(RenderCommand::Status(surface.status));

        if let (Some(output), Some(source)) = (self.latest_output().await, surface.output_source) {
            commands.push(RenderCommand::OutputFrame(OutputFrameMessage {
                source,
                mode: surface.output_mode,
                frame_index: surface.output_frame_index,
                mime: output.mime,
                data: base64::engine::general_purpose::STANDARD.encode(output.data.as_slice()),
                timestamp: surface
                    .output_updated_at
                    .unwrap_or_else(Utc::now)
                    .to_rfc3339(),
            }));
        }

        commands
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    async fn broadcast(&self, command: &RenderCommand) {
        let kind = command.kind();
        if matches!(command, RenderCommand::OutputFrame(_)) {
            tracing::trace!(message_type = %kind, "Broadcasting render command");
        } else {
            tracing::debug!(message_type = %kind, "Broadcasting render command");
        }

        let connections = self.connections.read().await;
        if connections.is_empty() {
            return;
        }

        let json = match serde_json::to_string(command) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize render command");
                return;
            }
        };

        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send render command");
            }
        }
    }
}

impl Default for DisplayHub {
    fn default() -> Self {
        Self::new()
    }
}

fn sniff_mime(data: &[u8]) -> String {
    image::guess_format(data)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_HEADER: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

    #[tokio::test]
    async fn test_render_updates_surface() {
        let hub = DisplayHub::new();

        hub.render(RenderCommand::ActiveMode(TrackingMode::Sam2)).await;
        hub.render(RenderCommand::LivePreview(false)).await;
        hub.render(RenderCommand::PlaybackControls(true)).await;
        hub.render(RenderCommand::ScrubPosition(ScrubPositionMessage {
            frame: 12,
            total_frames: 199,
        }))
        .await;
        hub.render(RenderCommand::PlayState(PlayStateMessage::new(true))).await;
        hub.set_status("SAM2 segmentation playback mode.").await;

        let surface = hub.surface().await;
        assert_eq!(surface.active_mode, Some(TrackingMode::Sam2));
        assert!(!surface.live_preview_visible);
        assert!(surface.playback_controls_visible);
        assert_eq!(surface.scrub.unwrap().frame, 12);
        assert_eq!(surface.play_state.label, PAUSE_LABEL);
        assert_eq!(surface.status, "SAM2 segmentation playback mode.");
    }

    #[tokio::test]
    async fn test_present_output_keeps_latest_bytes() {
        let hub = DisplayHub::new();
        assert!(hub.latest_output().await.is_none());

        hub.present_output(FrameSource::Playback, None, Some(3), JPEG_HEADER.to_vec())
            .await;

        let latest = hub.latest_output().await.unwrap();
        assert_eq!(latest.mime, "image/jpeg");
        assert_eq!(latest.data.as_slice(), &JPEG_HEADER);

        let surface = hub.surface().await;
        assert_eq!(surface.output_source, Some(FrameSource::Playback));
        assert_eq!(surface.output_frame_index, Some(3));
        assert_eq!(surface.outputs_presented, 1);
    }

    #[tokio::test]
    async fn test_viewers_receive_json_commands() {
        let hub = DisplayHub::new();
        let (id, mut rx) = hub.register().await;
        assert_eq!(hub.connection_count(), 1);

        hub.set_status("Camera ON (marker).").await;

        let msg = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["data"], "Camera ON (marker).");

        hub.unregister(&id).await;
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_replay_rebuilds_surface() {
        let hub = DisplayHub::new();
        assert!(!hub
            .replay_commands()
            .await
            .iter()
            .any(|c| matches!(c, RenderCommand::OutputFrame(_))));

        hub.render(RenderCommand::ActiveMode(TrackingMode::Marker)).await;
        hub.present_output(FrameSource::Live, Some(TrackingMode::Marker), None, JPEG_HEADER.to_vec())
            .await;
        hub.set_status("Camera ON (marker).").await;

        let commands = hub.replay_commands().await;
        assert!(matches!(
            commands.first(),
            Some(RenderCommand::ActiveMode(TrackingMode::Marker))
        ));
        assert!(commands
            .iter()
            .any(|c| matches!(c, RenderCommand::Status(s) if s == "Camera ON (marker).")));
        match commands.last() {
            Some(RenderCommand::OutputFrame(frame)) => {
                assert_eq!(frame.source, FrameSource::Live);
                assert_eq!(frame.mime, "image/jpeg");
                assert_eq!(frame.data, "/9j/4A==");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_output_frame_serialization() {
        let cmd = RenderCommand::OutputFrame(OutputFrameMessage {
            source: FrameSource::Live,
            mode: Some(TrackingMode::Marker),
            frame_index: None,
            mime: "image/jpeg".to_string(),
            data: "AAAA".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        });

        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"output_frame\""));
        assert!(json.contains("\"source\":\"live\""));
        assert!(json.contains("\"mode\":\"marker\""));
        assert!(!json.contains("frame_index"));
    }

    #[test]
    fn test_unknown_bytes_mime() {
        assert_eq!(sniff_mime(b"not an image"), "application/octet-stream");
    }
}

//! ModeController - Tracking mode state machine
//!
//! ## Responsibilities
//!
//! - Own the camera, the capture loop and the playback session
//! - Perform every mode transition (tear down, notify, set up)
//! - Apply timer ticks and network completions that are still current
//! - Report outcomes to the display surface
//!
//! ## Design
//!
//! The controller is a plain struct driven by [`ControllerEvent`]s, one at a
//! time, from a single task (see [`runner`]). Timers and network requests
//! never touch controller state directly: they post events back into the
//! queue, and stale ones are filtered by generation / load token checks.

pub mod runner;

pub use runner::{spawn, ControllerHandle};

use crate::backend_client::TrackingBackend;
use crate::camera_resource::{CameraResource, CaptureDevice, Frame};
use crate::display_hub::{
    DisplayHub, FrameSource, PlayStateMessage, RenderCommand, ScrubPositionMessage,
};
use crate::error::{Error, Result};
use crate::frame_capture::{self, CaptureSettings, FrameCaptureLoop, SampleDisposition, SampleTicket};
use crate::models::TrackingMode;
use crate::playback_session::{
    FrameRequest, PlaybackAction, PlaybackSession, PlaybackSettings, TickOutcome,
};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Reply channel for controller inputs
pub type Reply = oneshot::Sender<Result<ControllerSnapshot>>;

/// Everything the controller reacts to
#[derive(Debug)]
pub enum ControllerEvent {
    /// Mode-selection control
    SetMode { mode: TrackingMode, reply: Reply },
    /// Playback control button
    Playback { action: PlaybackAction, reply: Reply },
    /// Scrub control
    Seek { frame: i64, reply: Reply },
    /// Retry camera acquisition in a live mode
    RetryCamera { reply: Reply },
    /// Read-only state query
    Snapshot {
        reply: oneshot::Sender<ControllerSnapshot>,
    },
    /// Latest camera frame for the live-preview surface
    Preview {
        reply: oneshot::Sender<Option<Frame>>,
    },
    /// Tear everything down and stop the event loop
    Shutdown { reply: oneshot::Sender<()> },

    /// Capture trigger fired
    CaptureTick { generation: u64 },
    /// A live sample upload completed
    SampleFinished {
        ticket: SampleTicket,
        result: Result<Vec<u8>>,
    },
    /// Playback auto-advance fired
    PlaybackTick { generation: u64 },
    /// A playback frame fetch completed
    FrameFetched {
        request: FrameRequest,
        result: Result<Vec<u8>>,
    },
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub initial_mode: TrackingMode,
    pub capture: CaptureSettings,
    pub playback: PlaybackSettings,
    pub camera_acquire_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            initial_mode: TrackingMode::Marker,
            capture: CaptureSettings::default(),
            playback: PlaybackSettings::default(),
            camera_acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Camera part of the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSnapshot {
    pub held: bool,
    pub label: Option<String>,
}

/// Capture loop part of the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSnapshot {
    pub active: bool,
    pub backend_mode: Option<TrackingMode>,
    pub generation: u64,
    pub samples_in_flight: usize,
    pub samples_completed: u64,
}

/// Playback part of the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub current_frame: usize,
    pub total_frames: usize,
    pub playing: bool,
    pub timer_active: bool,
}

/// Read-only view of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub mode: TrackingMode,
    pub activated: bool,
    pub camera: CameraSnapshot,
    pub capture: CaptureSnapshot,
    pub playback: PlaybackSnapshot,
}

/// ModeController instance
pub struct ModeController {
    mode: TrackingMode,
    activated: bool,
    camera: CameraResource,
    capture: FrameCaptureLoop,
    playback: PlaybackSession,
    backend: Arc<dyn TrackingBackend>,
    hub: Arc<DisplayHub>,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

impl ModeController {
    /// Create new ModeController
    ///
    /// Returns the controller and the receiving end of its event queue.
    pub fn new(
        config: ControllerConfig,
        device: Arc<dyn CaptureDevice>,
        backend: Arc<dyn TrackingBackend>,
        hub: Arc<DisplayHub>,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();

        let controller = Self {
            mode: config.initial_mode,
            activated: false,
            camera: CameraResource::with_timeout(device, config.camera_acquire_timeout),
            capture: FrameCaptureLoop::new(config.capture),
            playback: PlaybackSession::new(config.playback),
            backend,
            hub,
            events,
        };

        (controller, rx)
    }

    /// Handle for posting inputs from other tasks
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle::new(self.events.clone())
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn camera(&self) -> &CameraResource {
        &self.camera
    }

    pub fn capture(&self) -> &FrameCaptureLoop {
        &self.capture
    }

    pub fn playback_session(&self) -> &PlaybackSession {
        &self.playback
    }

    /// Run the entry actions of the initial mode
    ///
    /// Only the first call does anything.
    pub async fn activate(&mut self) -> Result<()> {
        if self.activated {
            return Ok(());
        }
        self.activated = true;

        tracing::info!(mode = %self.mode, "Activating tracking controller");

        self.notify_backend(self.mode);
        self.enter_mode(self.mode).await
    }

    /// Switch to `target`
    ///
    /// An error means the camera could not be acquired; the mode changed
    /// anyway.
    pub async fn set_mode(&mut self, target: TrackingMode) -> Result<()> {
        if target == self.mode {
            tracing::debug!(mode = %target, "Mode unchanged");
            return Ok(());
        }

        let previous = self.mode;
        self.leave_mode(previous).await;

        self.mode = target;
        tracing::info!(from = %previous, to = %target, "Mode changed");
        self.notify_backend(target);

        self.enter_mode(target).await
    }

    /// Playback control, only while `sam2` is active
    pub async fn playback(&mut self, action: PlaybackAction) -> Result<()> {
        self.require_playback()?;

        match action {
            PlaybackAction::Previous => {
                if let Some(request) = self.playback.previous() {
                    self.request_frame(request).await;
                }
            }
            PlaybackAction::Next => {
                if let Some(request) = self.playback.next() {
                    self.request_frame(request).await;
                }
            }
            PlaybackAction::Restart => {
                let request = self.playback.restart();
                self.request_frame(request).await;
            }
            PlaybackAction::TogglePlay => {
                let tx = self.events.clone();
                let playing = self.playback.toggle_play(move |generation| {
                    match tx.send(ControllerEvent::PlaybackTick { generation }) {
                        Ok(()) => ControlFlow::Continue(()),
                        Err(_) => ControlFlow::Break(()),
                    }
                });
                self.render_play_state(playing).await;
            }
        }

        Ok(())
    }

    /// Scrub to `frame` (clamped), playback keeps running
    pub async fn seek(&mut self, frame: i64) -> Result<()> {
        self.require_playback()?;

        let request = self.playback.load_frame(frame);
        self.request_frame(request).await;
        Ok(())
    }

    /// Re-run camera acquisition after a failure
    pub async fn retry_camera(&mut self) -> Result<()> {
        if !self.mode.is_live() || self.camera.is_held() {
            tracing::debug!(
                mode = %self.mode,
                camera_held = self.camera.is_held(),
                "Camera retry ignored"
            );
            return Ok(());
        }

        tracing::info!(mode = %self.mode, "Retrying camera acquisition");
        self.start_live(self.mode).await
    }

    /// Stop all timers and release the camera
    pub async fn shutdown(&mut self) {
        tracing::info!(mode = %self.mode, "Shutting down tracking controller");

        self.capture.stop();
        self.camera.release();
        if self.playback.stop_playing() {
            self.render_play_state(false).await;
        }
    }

    /// Frame bound to the live-preview surface
    ///
    /// `None` outside live modes, without a camera, or before the first frame.
    pub fn preview_frame(&self) -> Option<Frame> {
        if !self.mode.is_live() {
            return None;
        }
        self.camera.latest_frame()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            mode: self.mode,
            activated: self.activated,
            camera: CameraSnapshot {
                held: self.camera.is_held(),
                label: self.camera.label(),
            },
            capture: CaptureSnapshot {
                active: self.capture.is_active(),
                backend_mode: self.capture.backend_mode(),
                generation: self.capture.generation(),
                samples_in_flight: self.capture.in_flight(),
                samples_completed: self.capture.completed(),
            },
            playback: PlaybackSnapshot {
                current_frame: self.playback.current_frame(),
                total_frames: self.playback.total_frames(),
                playing: self.playback.is_playing(),
                timer_active: self.playback.has_timer(),
            },
        }
    }

    /// Process one event
    ///
    /// Returns `Break` after a shutdown request.
    pub async fn handle_event(&mut self, event: ControllerEvent) -> ControlFlow<()> {
        match event {
            ControllerEvent::SetMode { mode, reply } => {
                let result = self.set_mode(mode).await;
                self.reply(reply, result);
            }
            ControllerEvent::Playback { action, reply } => {
                let result = self.playback(action).await;
                self.reply(reply, result);
            }
            ControllerEvent::Seek { frame, reply } => {
                let result = self.seek(frame).await;
                self.reply(reply, result);
            }
            ControllerEvent::RetryCamera { reply } => {
                let result = self.retry_camera().await;
                self.reply(reply, result);
            }
            ControllerEvent::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            ControllerEvent::Preview { reply } => {
                let _ = reply.send(self.preview_frame());
            }
            ControllerEvent::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
            ControllerEvent::CaptureTick { generation } => self.on_capture_tick(generation),
            ControllerEvent::SampleFinished { ticket, result } => {
                self.on_sample_finished(ticket, result).await
            }
            ControllerEvent::PlaybackTick { generation } => {
                self.on_playback_tick(generation).await
            }
            ControllerEvent::FrameFetched { request, result } => {
                self.on_frame_fetched(request, result).await
            }
        }

        ControlFlow::Continue(())
    }

    fn reply(&self, reply: Reply, result: Result<()>) {
        // The caller may have given up waiting
        let _ = reply.send(result.map(|_| self.snapshot()));
    }

    fn require_playback(&self) -> Result<()> {
        if self.mode == TrackingMode::Sam2 {
            Ok(())
        } else {
            Err(Error::Conflict(format!(
                "playback controls are only available in sam2 mode (current mode: {})",
                self.mode
            )))
        }
    }

    async fn leave_mode(&mut self, mode: TrackingMode) {
        if mode.is_live() {
            self.capture.stop();
            self.camera.release();
        } else if self.playback.stop_playing() {
            self.render_play_state(false).await;
        }
    }

    async fn enter_mode(&mut self, mode: TrackingMode) -> Result<()> {
        self.hub.render(RenderCommand::ActiveMode(mode)).await;

        if mode.is_live() {
            self.hub.render(RenderCommand::PlaybackControls(false)).await;
            self.hub.render(RenderCommand::LivePreview(true)).await;
            self.hub
                .set_status(format!("Mode: {}. Using webcam for tracking.", mode))
                .await;

            self.start_live(mode).await
        } else {
            self.hub.render(RenderCommand::LivePreview(false)).await;
            self.hub.render(RenderCommand::PlaybackControls(true)).await;
            self.hub.set_status("SAM2 segmentation playback mode.").await;
            self.render_play_state(self.playback.is_playing()).await;

            let request = self.playback.reload();
            self.request_frame(request).await;
            Ok(())
        }
    }

    /// Acquire the camera and start sampling
    async fn start_live(&mut self, mode: TrackingMode) -> Result<()> {
        if let Err(e) = self.camera.acquire().await {
            tracing::warn!(mode = %mode, error = %e, "Live mode entered without a camera");
            self.hub.set_status(e.to_string()).await;
            return Err(e);
        }

        let tx = self.events.clone();
        self.capture.start(mode, move |generation| {
            match tx.send(ControllerEvent::CaptureTick { generation }) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            }
        });

        self.hub.set_status(format!("Camera ON ({}).", mode)).await;
        Ok(())
    }

    /// Best-effort backend mode notification
    fn notify_backend(&self, mode: TrackingMode) {
        let backend = self.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.set_mode(mode).await {
                tracing::warn!(mode = %mode, error = %e, "Backend mode notification failed");
            }
        });
    }

    fn on_capture_tick(&mut self, generation: u64) {
        if !self.capture.accepts(generation) {
            return;
        }

        // Camera not ready yet
        let Some(frame) = self.camera.latest_frame() else {
            return;
        };

        let Some(ticket) = self.capture.begin_sample(generation) else {
            return;
        };

        let backend = self.backend.clone();
        let quality = self.capture.settings().jpeg_quality;
        let tx = self.events.clone();

        tokio::spawn(async move {
            let result = frame_capture::run_sample(backend, frame, quality, ticket).await;
            let _ = tx.send(ControllerEvent::SampleFinished { ticket, result });
        });
    }

    async fn on_sample_finished(&mut self, ticket: SampleTicket, result: Result<Vec<u8>>) {
        match self.capture.finish_sample(&ticket) {
            SampleDisposition::Apply => match result {
                Ok(image) => {
                    tracing::debug!(
                        mode = %ticket.mode,
                        sequence = ticket.sequence,
                        size = image.len(),
                        "Processed frame received"
                    );
                    self.hub
                        .present_output(FrameSource::Live, Some(ticket.mode), None, image)
                        .await;
                }
                Err(e) => {
                    tracing::warn!(
                        mode = %ticket.mode,
                        sequence = ticket.sequence,
                        error = %e,
                        "Frame processing failed"
                    );
                    self.hub.set_status(e.to_string()).await;
                }
            },
            disposition => {
                tracing::debug!(
                    generation = ticket.generation,
                    sequence = ticket.sequence,
                    disposition = ?disposition,
                    "Discarding sample response"
                );
            }
        }
    }

    async fn on_playback_tick(&mut self, generation: u64) {
        if self.mode != TrackingMode::Sam2 {
            return;
        }

        match self.playback.on_tick(generation) {
            TickOutcome::Ignored => {}
            TickOutcome::Advanced { request, finished } => {
                self.request_frame(request).await;
                if finished {
                    self.render_play_state(false).await;
                }
            }
            TickOutcome::Finished => self.render_play_state(false).await,
        }
    }

    async fn on_frame_fetched(&mut self, request: FrameRequest, result: Result<Vec<u8>>) {
        if self.mode != TrackingMode::Sam2 || !self.playback.is_current(&request) {
            tracing::debug!(
                frame_index = request.index,
                token = request.token,
                "Discarding superseded playback frame"
            );
            return;
        }

        match result {
            Ok(image) => {
                self.hub
                    .present_output(FrameSource::Playback, None, Some(request.index), image)
                    .await;
            }
            Err(e) => {
                tracing::warn!(frame_index = request.index, error = %e, "Playback frame fetch failed");
                self.hub.set_status(e.to_string()).await;
            }
        }
    }

    /// Sync the scrub control and fetch `request` in the background
    async fn request_frame(&self, request: FrameRequest) {
        self.hub
            .render(RenderCommand::ScrubPosition(ScrubPositionMessage {
                frame: request.index,
                total_frames: self.playback.total_frames(),
            }))
            .await;

        let backend = self.backend.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = backend.fetch_playback_frame(request.index).await;
            let _ = tx.send(ControllerEvent::FrameFetched { request, result });
        });
    }

    async fn render_play_state(&self, playing: bool) {
        self.hub
            .render(RenderCommand::PlayState(PlayStateMessage::new(playing)))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_resource::{CaptureStream, Frame, UnavailableDevice};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticStream;

    impl CaptureStream for StaticStream {
        fn label(&self) -> String {
            "static".to_string()
        }

        fn latest_frame(&self) -> Option<Frame> {
            Some(Frame::new(8, 8))
        }

        fn stop(&mut self) {}
    }

    #[derive(Default)]
    struct CountingDevice {
        opens: AtomicU32,
    }

    #[async_trait]
    impl CaptureDevice for CountingDevice {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        async fn open(&self) -> Result<Box<dyn CaptureStream>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StaticStream))
        }
    }

    struct NullBackend;

    #[async_trait]
    impl TrackingBackend for NullBackend {
        async fn process_frame(&self, _mode: TrackingMode, jpeg: Vec<u8>) -> Result<Vec<u8>> {
            Ok(jpeg)
        }

        async fn fetch_playback_frame(&self, index: usize) -> Result<Vec<u8>> {
            Ok(vec![index as u8])
        }

        async fn set_mode(&self, _mode: TrackingMode) -> Result<()> {
            Ok(())
        }
    }

    fn controller(device: Arc<dyn CaptureDevice>) -> ModeController {
        let (controller, _rx) = ModeController::new(
            ControllerConfig::default(),
            device,
            Arc::new(NullBackend),
            Arc::new(DisplayHub::new()),
        );
        controller
    }

    #[tokio::test]
    async fn test_activate_starts_initial_live_mode() {
        let device = Arc::new(CountingDevice::default());
        let mut c = controller(device.clone());

        c.activate().await.unwrap();
        let snap = c.snapshot();
        assert!(snap.activated);
        assert!(snap.camera.held);
        assert!(snap.capture.active);
        assert_eq!(snap.capture.backend_mode, Some(TrackingMode::Marker));

        // Second activation does nothing
        c.activate().await.unwrap();
        assert_eq!(device.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_mode_is_noop() {
        let device = Arc::new(CountingDevice::default());
        let mut c = controller(device.clone());
        c.activate().await.unwrap();
        let generation = c.capture().generation();

        c.set_mode(TrackingMode::Marker).await.unwrap();
        assert_eq!(device.opens.load(Ordering::SeqCst), 1);
        assert_eq!(c.capture().generation(), generation);
    }

    #[tokio::test]
    async fn test_live_to_playback_releases_camera() {
        let mut c = controller(Arc::new(CountingDevice::default()));
        c.activate().await.unwrap();

        c.set_mode(TrackingMode::Sam2).await.unwrap();
        let snap = c.snapshot();
        assert!(!snap.camera.held);
        assert!(!snap.capture.active);
        assert!(!snap.playback.timer_active);
        assert_eq!(c.hub.surface().await.status, "SAM2 segmentation playback mode.");
    }

    #[tokio::test]
    async fn test_preview_follows_held_camera() {
        let mut c = controller(Arc::new(CountingDevice::default()));
        assert!(c.preview_frame().is_none());

        c.activate().await.unwrap();
        assert_eq!(c.preview_frame().unwrap().dimensions(), (8, 8));

        c.set_mode(TrackingMode::Sam2).await.unwrap();
        assert!(c.preview_frame().is_none());
    }

    #[tokio::test]
    async fn test_playback_rejected_outside_sam2() {
        let mut c = controller(Arc::new(CountingDevice::default()));
        c.activate().await.unwrap();

        assert!(matches!(
            c.playback(PlaybackAction::Next).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(c.seek(10).await, Err(Error::Conflict(_))));
        assert_eq!(c.playback_session().current_frame(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_camera_then_retry() {
        let mut c = controller(Arc::new(UnavailableDevice::new("disabled")));

        assert!(matches!(c.activate().await, Err(Error::CapabilityUnavailable)));
        assert_eq!(c.mode(), TrackingMode::Marker);
        assert!(!c.camera().is_held());
        assert!(!c.capture().is_active());
        assert_eq!(
            c.hub.surface().await.status,
            "Camera capture is not available on this system."
        );

        assert!(c.retry_camera().await.is_err());
        assert!(!c.capture().is_active());
    }

    #[tokio::test]
    async fn test_retry_is_noop_with_camera_held() {
        let device = Arc::new(CountingDevice::default());
        let mut c = controller(device.clone());
        c.activate().await.unwrap();

        c.retry_camera().await.unwrap();
        assert_eq!(device.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let mut c = controller(Arc::new(CountingDevice::default()));
        c.activate().await.unwrap();

        c.shutdown().await;
        let snap = c.snapshot();
        assert!(!snap.camera.held);
        assert!(!snap.capture.active);
    }
}

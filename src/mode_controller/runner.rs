//! Controller event loop and its handle

use super::{ControllerEvent, ControllerSnapshot, ModeController};
use crate::camera_resource::Frame;
use crate::error::{Error, Result};
use crate::models::TrackingMode;
use crate::playback_session::PlaybackAction;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Cloneable handle for posting inputs to a running controller
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl ControllerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self { tx }
    }

    pub async fn set_mode(&self, mode: TrackingMode) -> Result<ControllerSnapshot> {
        self.request(|reply| ControllerEvent::SetMode { mode, reply })
            .await?
    }

    pub async fn playback(&self, action: PlaybackAction) -> Result<ControllerSnapshot> {
        self.request(|reply| ControllerEvent::Playback { action, reply })
            .await?
    }

    pub async fn seek(&self, frame: i64) -> Result<ControllerSnapshot> {
        self.request(|reply| ControllerEvent::Seek { frame, reply })
            .await?
    }

    pub async fn retry_camera(&self) -> Result<ControllerSnapshot> {
        self.request(|reply| ControllerEvent::RetryCamera { reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot> {
        self.request(|reply| ControllerEvent::Snapshot { reply }).await
    }

    pub async fn preview_frame(&self) -> Result<Option<Frame>> {
        self.request(|reply| ControllerEvent::Preview { reply }).await
    }

    /// Ask the controller to tear down and wait until it did
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| ControllerEvent::Shutdown { reply }).await
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControllerEvent,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| Error::Internal("tracking controller is not running".to_string()))?;
        rx.await
            .map_err(|_| Error::Internal("tracking controller stopped before replying".to_string()))
    }
}

/// Activate the controller and run its event loop until shutdown
pub fn spawn(
    mut controller: ModeController,
    mut events: mpsc::UnboundedReceiver<ControllerEvent>,
) -> (ControllerHandle, JoinHandle<()>) {
    let handle = controller.handle();

    let task = tokio::spawn(async move {
        if let Err(e) = controller.activate().await {
            tracing::warn!(mode = %controller.mode(), error = %e, "Initial mode started degraded");
        }

        while let Some(event) = events.recv().await {
            if controller.handle_event(event).await.is_break() {
                break;
            }
        }

        tracing::info!("Tracking controller stopped");
    });

    (handle, task)
}

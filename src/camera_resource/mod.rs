//! CameraResource - Exclusive ownership of the local capture device
//!
//! ## Responsibilities
//!
//! - Acquire a capture stream from the configured device (bounded wait)
//! - Hold at most one stream at a time
//! - Hand out the latest frame to the capture loop
//! - Release the stream (idempotent, also on drop)
//!
//! The device side is abstracted behind [`CaptureDevice`] / [`CaptureStream`]
//! so that webcam, still-image and test devices share one lifecycle.

mod device;
#[cfg(any(feature = "webcam", test))]
mod release_gate;
#[cfg(feature = "webcam")]
mod webcam;

pub use device::{build_device, CameraSource, StillImageDevice, UnavailableDevice};
#[cfg(feature = "webcam")]
pub use webcam::WebcamDevice;

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// A single captured frame
pub type Frame = RgbImage;

/// Default acquisition timeout (10 seconds)
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 10_000;

/// Something that can open a capture stream
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Human-readable device description
    fn describe(&self) -> String;

    /// Open a new stream
    async fn open(&self) -> Result<Box<dyn CaptureStream>>;
}

/// An open capture stream
pub trait CaptureStream: Send + Sync {
    fn label(&self) -> String;

    /// Most recent frame, `None` until the stream has produced one
    fn latest_frame(&self) -> Option<Frame>;

    /// Stop all underlying tracks
    fn stop(&mut self);
}

/// CameraResource instance
pub struct CameraResource {
    device: Arc<dyn CaptureDevice>,
    stream: Option<Box<dyn CaptureStream>>,
    acquire_timeout: Duration,
}

impl CameraResource {
    /// Create new CameraResource
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self::with_timeout(device, Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS))
    }

    /// Create with a custom acquisition timeout
    pub fn with_timeout(device: Arc<dyn CaptureDevice>, acquire_timeout: Duration) -> Self {
        Self {
            device,
            stream: None,
            acquire_timeout,
        }
    }

    /// Acquire the capture device
    ///
    /// On failure nothing is held.
    pub async fn acquire(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::Internal(
                "camera acquired while a stream is already held".to_string(),
            ));
        }

        let device = self.device.describe();
        tracing::debug!(device = %device, "Requesting camera access");

        match timeout(self.acquire_timeout, self.device.open()).await {
            Ok(Ok(stream)) => {
                tracing::info!(device = %device, label = %stream.label(), "Camera acquired");
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(device = %device, error = %e, "Camera acquisition failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    device = %device,
                    timeout_ms = self.acquire_timeout.as_millis() as u64,
                    "Camera acquisition timed out"
                );
                Err(Error::AcquisitionFailed(format!(
                    "no response from {} within {} ms",
                    device,
                    self.acquire_timeout.as_millis()
                )))
            }
        }
    }

    /// Release the capture device
    ///
    /// Returns true if a stream was actually held.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop();
                tracing::info!(label = %stream.label(), "Camera released");
                true
            }
            None => false,
        }
    }

    pub fn is_held(&self) -> bool {
        self.stream.is_some()
    }

    pub fn label(&self) -> Option<String> {
        self.stream.as_ref().map(|s| s.label())
    }

    /// Latest frame if a stream is held and has produced one
    pub fn latest_frame(&self) -> Option<Frame> {
        self.stream.as_ref().and_then(|s| s.latest_frame())
    }
}

impl Drop for CameraResource {
    fn drop(&mut self) {
        self.release();
    }
}

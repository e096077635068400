//! Capture device backends and source selection

use super::{CaptureDevice, CaptureStream, Frame};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configured camera source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSource {
    /// Local camera by index (`webcam:<n>` or just `<n>`)
    Webcam(u32),
    /// Still image repeated as every frame (`file:<path>`)
    StillImage(PathBuf),
    /// No capture capability (`none`)
    Disabled,
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSource::Webcam(index) => write!(f, "webcam:{}", index),
            CameraSource::StillImage(path) => write!(f, "file:{}", path.display()),
            CameraSource::Disabled => f.write_str("none"),
        }
    }
}

impl FromStr for CameraSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("disabled") {
            return Ok(CameraSource::Disabled);
        }
        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(Error::Config("CAMERA_SOURCE file: needs a path".to_string()));
            }
            return Ok(CameraSource::StillImage(PathBuf::from(path)));
        }
        let index = s.strip_prefix("webcam:").unwrap_or(s);
        index
            .parse::<u32>()
            .map(CameraSource::Webcam)
            .map_err(|_| {
                Error::Config(format!(
                    "Invalid CAMERA_SOURCE '{}' (expected webcam:<index>, file:<path> or none)",
                    s
                ))
            })
    }
}

/// Build the capture device for a source
pub fn build_device(source: &CameraSource) -> Arc<dyn CaptureDevice> {
    match source {
        #[cfg(feature = "webcam")]
        CameraSource::Webcam(index) => Arc::new(super::WebcamDevice::new(*index)),
        #[cfg(not(feature = "webcam"))]
        CameraSource::Webcam(index) => {
            tracing::warn!(
                index = index,
                "Built without the `webcam` feature; camera capture is unavailable"
            );
            Arc::new(UnavailableDevice::new("webcam support not compiled in"))
        }
        CameraSource::StillImage(path) => Arc::new(StillImageDevice::new(path.clone())),
        CameraSource::Disabled => Arc::new(UnavailableDevice::new("camera disabled")),
    }
}

/// Device for runtimes without any capture capability
pub struct UnavailableDevice {
    reason: String,
}

impl UnavailableDevice {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CaptureDevice for UnavailableDevice {
    fn describe(&self) -> String {
        format!("unavailable ({})", self.reason)
    }

    async fn open(&self) -> Result<Box<dyn CaptureStream>> {
        Err(Error::CapabilityUnavailable)
    }
}

/// Device that serves one decoded image file as a constant frame
pub struct StillImageDevice {
    path: PathBuf,
}

impl StillImageDevice {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CaptureDevice for StillImageDevice {
    fn describe(&self) -> String {
        format!("still image {}", self.path.display())
    }

    async fn open(&self) -> Result<Box<dyn CaptureStream>> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => Error::PermissionDenied(format!(
                "{}: {}",
                self.path.display(),
                e
            )),
            _ => Error::AcquisitionFailed(format!("{}: {}", self.path.display(), e)),
        })?;

        let frame = image::load_from_memory(&data)
            .map_err(|e| {
                Error::AcquisitionFailed(format!("{}: {}", self.path.display(), e))
            })?
            .to_rgb8();

        tracing::debug!(
            path = %self.path.display(),
            width = frame.width(),
            height = frame.height(),
            "Still image loaded"
        );

        Ok(Box::new(StillImageStream {
            label: self.path.display().to_string(),
            frame: Some(frame),
        }))
    }
}

struct StillImageStream {
    label: String,
    frame: Option<Frame>,
}

impl CaptureStream for StillImageStream {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.frame.clone()
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}

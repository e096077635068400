//! Local webcam capture via nokhwa
//!
//! The nokhwa camera lives on a dedicated capture thread (it is not `Send`
//! on every platform). The thread keeps the newest decoded frame in a shared
//! slot; the stream handle only reads that slot and raises the stop flag.
//! A released thread is parked in the device's [`ReleaseGate`] so the next
//! `open` starts only after the camera was closed.

use super::release_gate::ReleaseGate;
use super::{CaptureDevice, CaptureStream, Frame};
use crate::error::{Error, Result};
use async_trait::async_trait;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

/// Pause after a failed frame grab before trying again
const GRAB_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Webcam selected by index
pub struct WebcamDevice {
    index: u32,
    gate: ReleaseGate,
}

impl WebcamDevice {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            gate: ReleaseGate::default(),
        }
    }
}

#[async_trait]
impl CaptureDevice for WebcamDevice {
    fn describe(&self) -> String {
        format!("webcam #{}", self.index)
    }

    async fn open(&self) -> Result<Box<dyn CaptureStream>> {
        self.gate.wait().await;

        let index = self.index;
        let latest: Arc<Mutex<Option<Frame>>> = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<String>>();

        let slot = latest.clone();
        let stop_flag = stop.clone();
        let thread = std::thread::Builder::new()
            .name(format!("webcam-{}", index))
            .spawn(move || capture_thread(index, slot, stop_flag, ready_tx))?;

        let label = match ready_rx.await {
            Ok(Ok(label)) => label,
            Ok(Err(e)) => {
                self.gate.hand_over(thread);
                return Err(e);
            }
            Err(_) => {
                self.gate.hand_over(thread);
                return Err(Error::AcquisitionFailed(
                    "capture thread exited before the camera opened".to_string(),
                ));
            }
        };

        Ok(Box::new(WebcamStream {
            label,
            latest,
            stop,
            thread: Some(thread),
            gate: self.gate.clone(),
        }))
    }
}

fn capture_thread(
    index: u32,
    slot: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<String>>,
) {
    let requested =
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

    let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(Error::AcquisitionFailed(e.to_string())));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(Error::AcquisitionFailed(e.to_string())));
        return;
    }

    let label = format!("{} ({})", camera.info().human_name(), camera.camera_format());
    if ready.send(Ok(label)).is_err() {
        // Acquisition was abandoned (timeout); nobody will read frames
        let _ = camera.stop_stream();
        return;
    }

    while !stop.load(Ordering::Relaxed) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>());

        match decoded {
            Ok(image) => {
                let (width, height) = (image.width(), image.height());
                let frame = Frame::from_raw(width, height, image.into_raw());
                if let Ok(mut guard) = slot.lock() {
                    *guard = frame;
                }
            }
            Err(e) => {
                tracing::debug!(index = index, error = %e, "Webcam frame grab failed");
                std::thread::sleep(GRAB_RETRY_DELAY);
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!(index = index, error = %e, "Failed to stop webcam stream");
    }
}

struct WebcamStream {
    label: String,
    latest: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    gate: ReleaseGate,
}

impl CaptureStream for WebcamStream {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Ok(mut guard) = self.latest.lock() {
            *guard = None;
        }
        // The thread closes the camera after its current grab
        if let Some(thread) = self.thread.take() {
            self.gate.hand_over(thread);
        }
    }
}

impl Drop for WebcamStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            self.gate.hand_over(thread);
        }
    }
}

//! FrameCaptureLoop - Periodic live frame sampling
//!
//! ## Responsibilities
//!
//! - Periodic capture trigger while a live mode is active
//! - Tag every sample with (generation, sequence)
//! - Decide whether a finished sample may still reach the display
//! - JPEG encoding and upload of one sample
//!
//! Samples may overlap when the backend is slower than the trigger. A
//! response is applied only when its generation is still running and no
//! newer sample has been applied; everything else is discarded.

use crate::backend_client::TrackingBackend;
use crate::camera_resource::Frame;
use crate::error::{Error, Result};
use crate::models::TrackingMode;
use crate::periodic_task::PeriodicTask;
use image::codecs::jpeg::JpegEncoder;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

/// Default trigger interval (~6.7 samples/second)
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 150;

/// Default JPEG quality for uploads
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Capture loop settings
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_CAPTURE_INTERVAL_MS),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Identity of one issued sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTicket {
    pub generation: u64,
    pub sequence: u64,
    pub mode: TrackingMode,
}

/// What to do with a finished sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDisposition {
    /// Newest response of the running loop, display it
    Apply,
    /// Issued by a loop that has since been stopped or restarted
    Stale,
    /// A newer sample was already applied
    Superseded,
}

/// FrameCaptureLoop instance
pub struct FrameCaptureLoop {
    settings: CaptureSettings,
    task: Option<PeriodicTask>,
    backend_mode: Option<TrackingMode>,
    generation: u64,
    next_sequence: u64,
    last_applied: Option<u64>,
    in_flight: usize,
    completed: u64,
}

impl FrameCaptureLoop {
    /// Create new FrameCaptureLoop
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            task: None,
            backend_mode: None,
            generation: 0,
            next_sequence: 0,
            last_applied: None,
            in_flight: 0,
            completed: 0,
        }
    }

    /// Start sampling for `mode`
    ///
    /// `on_tick` receives the generation of this run and is called from the
    /// trigger task; it returns `Break` once nobody listens anymore.
    pub fn start<F>(&mut self, mode: TrackingMode, mut on_tick: F)
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        self.stop();

        self.generation += 1;
        self.last_applied = None;
        self.backend_mode = Some(mode);
        let generation = self.generation;

        self.task = Some(PeriodicTask::spawn(
            "frame-capture",
            self.settings.interval,
            move || on_tick(generation),
        ));

        tracing::info!(
            mode = %mode,
            generation = generation,
            interval_ms = self.settings.interval.as_millis() as u64,
            "Frame capture loop started"
        );
    }

    /// Stop sampling
    ///
    /// Returns true if the loop was running.
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.cancel();
                tracing::info!(
                    mode = ?self.backend_mode,
                    generation = self.generation,
                    in_flight = self.in_flight,
                    "Frame capture loop stopped"
                );
                self.backend_mode = None;
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub fn backend_mode(&self) -> Option<TrackingMode> {
        self.backend_mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Samples that came back (applied or discarded) since startup
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// True if a trigger of `generation` belongs to the running loop
    pub fn accepts(&self, generation: u64) -> bool {
        self.is_active() && generation == self.generation
    }

    /// Issue a sample for a trigger of `generation`
    pub fn begin_sample(&mut self, generation: u64) -> Option<SampleTicket> {
        if !self.accepts(generation) {
            return None;
        }
        let mode = self.backend_mode?;

        self.next_sequence += 1;
        self.in_flight += 1;

        Some(SampleTicket {
            generation,
            sequence: self.next_sequence,
            mode,
        })
    }

    /// Account for a finished sample and decide whether it may be displayed
    pub fn finish_sample(&mut self, ticket: &SampleTicket) -> SampleDisposition {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.completed += 1;

        if !self.accepts(ticket.generation) {
            return SampleDisposition::Stale;
        }

        if matches!(self.last_applied, Some(last) if ticket.sequence <= last) {
            return SampleDisposition::Superseded;
        }

        self.last_applied = Some(ticket.sequence);
        SampleDisposition::Apply
    }
}

/// Encode a frame as JPEG
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(frame)
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buf)
}

/// Encode and upload one sample, returning the processed image
pub async fn run_sample(
    backend: Arc<dyn TrackingBackend>,
    frame: Frame,
    quality: u8,
    ticket: SampleTicket,
) -> Result<Vec<u8>> {
    let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
        .await
        .map_err(|e| Error::Internal(format!("Encoder task failed: {}", e)))??;

    tracing::debug!(
        mode = %ticket.mode,
        generation = ticket.generation,
        sequence = ticket.sequence,
        size = jpeg.len(),
        "Uploading frame"
    );

    backend.process_frame(ticket.mode, jpeg).await
}

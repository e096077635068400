//! Fakes shared by the scenario tests

#![allow(dead_code)]

use async_trait::async_trait;
use live_tracker::backend_client::TrackingBackend;
use live_tracker::camera_resource::{CaptureDevice, CaptureStream, Frame};
use live_tracker::display_hub::DisplayHub;
use live_tracker::mode_controller::{ControllerConfig, ControllerEvent, ModeController};
use live_tracker::models::TrackingMode;
use live_tracker::{Error, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Ordered record of side effects across fakes
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == entry)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

pub struct FakeDevice {
    journal: Journal,
    pub opens: AtomicU32,
}

impl FakeDevice {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            opens: AtomicU32::new(0),
        }
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for FakeDevice {
    fn describe(&self) -> String {
        "fake camera".to_string()
    }

    async fn open(&self) -> Result<Box<dyn CaptureStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.journal.push("camera acquired");
        Ok(Box::new(FakeStream {
            journal: self.journal.clone(),
        }))
    }
}

struct FakeStream {
    journal: Journal,
}

impl CaptureStream for FakeStream {
    fn label(&self) -> String {
        "fake stream".to_string()
    }

    fn latest_frame(&self) -> Option<Frame> {
        Some(Frame::from_pixel(8, 8, image::Rgb([0, 128, 255])))
    }

    fn stop(&mut self) {
        self.journal.push("camera released");
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub journal: Journal,
    /// Delay before every upload answers
    pub upload_delay: Duration,
    /// Answer uploads with this HTTP status
    pub reject_uploads: Option<u16>,
    pub fail_fetches: bool,
}

impl FakeBackend {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TrackingBackend for FakeBackend {
    async fn process_frame(&self, mode: TrackingMode, jpeg: Vec<u8>) -> Result<Vec<u8>> {
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "upload must be a JPEG");
        self.journal.push(format!("upload {}", mode));

        if !self.upload_delay.is_zero() {
            tokio::time::sleep(self.upload_delay).await;
        }

        match self.reject_uploads {
            Some(status) => Err(Error::UploadRejected { status }),
            None => Ok(format!("processed {}", mode).into_bytes()),
        }
    }

    async fn fetch_playback_frame(&self, index: usize) -> Result<Vec<u8>> {
        self.journal.push(format!("fetch {}", index));

        if self.fail_fetches {
            return Err(Error::PlaybackFetchFailed {
                frame: index,
                reason: "HTTP 404 Not Found".to_string(),
            });
        }
        Ok(format!("frame {}", index).into_bytes())
    }

    async fn set_mode(&self, mode: TrackingMode) -> Result<()> {
        self.journal.push(format!("notify {}", mode));
        Ok(())
    }
}

pub struct Harness {
    pub controller: ModeController,
    pub events: UnboundedReceiver<ControllerEvent>,
    pub hub: Arc<DisplayHub>,
}

pub fn harness(
    config: ControllerConfig,
    device: Arc<dyn CaptureDevice>,
    backend: Arc<dyn TrackingBackend>,
) -> Harness {
    let hub = Arc::new(DisplayHub::new());
    let (controller, events) = ModeController::new(config, device, backend, hub.clone());
    Harness {
        controller,
        events,
        hub,
    }
}

impl Harness {
    /// Feed queued events to the controller until `done` holds
    pub async fn pump_until<F>(&mut self, mut done: F)
    where
        F: FnMut(&ModeController) -> bool,
    {
        let controller = &mut self.controller;
        let events = &mut self.events;

        tokio::time::timeout(Duration::from_secs(10), async {
            while !done(&*controller) {
                let event = events.recv().await.expect("event queue closed");
                if controller.handle_event(event).await.is_break() {
                    break;
                }
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Assert the resource invariants of the current state
    pub fn assert_invariants(&self) {
        let snap = self.controller.snapshot();

        let timers = snap.capture.active as u8 + snap.playback.timer_active as u8;
        assert!(timers <= 1, "both timers active: {:?}", snap);
        assert_eq!(snap.playback.playing, snap.playback.timer_active, "{:?}", snap);

        if snap.mode.is_live() {
            assert_eq!(snap.capture.active, snap.camera.held, "{:?}", snap);
        } else {
            assert!(!snap.camera.held, "camera held in playback: {:?}", snap);
            assert!(!snap.capture.active, "capture running in playback: {:?}", snap);
        }
        assert!(snap.playback.current_frame < snap.playback.total_frames);
    }
}

pub fn fast_config(initial_mode: TrackingMode) -> ControllerConfig {
    let mut config = ControllerConfig {
        initial_mode,
        ..Default::default()
    };
    config.capture.interval = Duration::from_millis(20);
    config
}

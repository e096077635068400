//! Application state
//!
//! Holds all shared components and configuration

use crate::backend_client::BackendClient;
use crate::camera_resource::CameraSource;
use crate::display_hub::DisplayHub;
use crate::error::{Error, Result};
use crate::frame_capture::{CaptureSettings, DEFAULT_CAPTURE_INTERVAL_MS, DEFAULT_JPEG_QUALITY};
use crate::mode_controller::{ControllerConfig, ControllerHandle};
use crate::models::TrackingMode;
use crate::playback_session::{
    PlaybackSettings, DEFAULT_PLAYBACK_INTERVAL_MS, DEFAULT_TOTAL_FRAMES,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Tracking backend base URL
    pub backend_url: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Capture device selection
    pub camera_source: CameraSource,
    /// Mode entered at startup
    pub initial_mode: TrackingMode,
    pub capture_interval: Duration,
    pub playback_interval: Duration,
    /// Number of precomputed playback frames
    pub playback_total_frames: usize,
    /// JPEG quality for uploads (1-100)
    pub jpeg_quality: u8,
    /// Backend request timeout
    pub http_timeout: Duration,
    pub camera_acquire_timeout: Duration,
    /// UI page directory, served at `/` when set
    pub static_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5000".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8090,
            camera_source: CameraSource::Webcam(0),
            initial_mode: TrackingMode::Marker,
            capture_interval: Duration::from_millis(DEFAULT_CAPTURE_INTERVAL_MS),
            playback_interval: Duration::from_millis(DEFAULT_PLAYBACK_INTERVAL_MS),
            playback_total_frames: DEFAULT_TOTAL_FRAMES,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            http_timeout: Duration::from_secs(30),
            camera_acquire_timeout: Duration::from_millis(10_000),
            static_dir: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            backend_url: lookup("BACKEND_URL").unwrap_or(defaults.backend_url),
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.port),
            camera_source: parse_var(&lookup, "CAMERA_SOURCE")?
                .unwrap_or(defaults.camera_source),
            initial_mode: parse_var(&lookup, "INITIAL_MODE")?.unwrap_or(defaults.initial_mode),
            capture_interval: parse_var(&lookup, "CAPTURE_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.capture_interval),
            playback_interval: parse_var(&lookup, "PLAYBACK_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.playback_interval),
            playback_total_frames: parse_var(&lookup, "PLAYBACK_TOTAL_FRAMES")?
                .unwrap_or(defaults.playback_total_frames),
            jpeg_quality: parse_var(&lookup, "JPEG_QUALITY")?.unwrap_or(defaults.jpeg_quality),
            http_timeout: parse_var(&lookup, "HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            camera_acquire_timeout: parse_var(&lookup, "CAMERA_ACQUIRE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.camera_acquire_timeout),
            static_dir: lookup("STATIC_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backend_url.trim().is_empty() {
            return Err(Error::Config("BACKEND_URL must not be empty".to_string()));
        }
        if self.capture_interval.is_zero() {
            return Err(Error::Config("CAPTURE_INTERVAL_MS must be positive".to_string()));
        }
        if self.playback_interval.is_zero() {
            return Err(Error::Config("PLAYBACK_INTERVAL_MS must be positive".to_string()));
        }
        if self.playback_total_frames == 0 {
            return Err(Error::Config("PLAYBACK_TOTAL_FRAMES must be positive".to_string()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "JPEG_QUALITY must be between 1 and 100 (got {})",
                self.jpeg_quality
            )));
        }
        if self.http_timeout.is_zero() || self.camera_acquire_timeout.is_zero() {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    /// Listen address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Controller part of the configuration
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            initial_mode: self.initial_mode,
            capture: CaptureSettings {
                interval: self.capture_interval,
                jpeg_quality: self.jpeg_quality,
            },
            playback: PlaybackSettings {
                total_frames: self.playback_total_frames,
                interval: self.playback_interval,
            },
            camera_acquire_timeout: self.camera_acquire_timeout,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}='{}': {}", key, raw, e))),
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Tracking controller inputs
    pub controller: ControllerHandle,
    /// DisplayHub (surface state + WebSocket)
    pub hub: Arc<DisplayHub>,
    /// Backend client (health checks)
    pub backend: Arc<BackendClient>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.backend_url, "http://localhost:5000");
        assert_eq!(config.bind_addr(), "0.0.0.0:8090");
        assert_eq!(config.camera_source, CameraSource::Webcam(0));
        assert_eq!(config.initial_mode, TrackingMode::Marker);
        assert_eq!(config.capture_interval, Duration::from_millis(150));
        assert_eq!(config.playback_interval, Duration::from_millis(100));
        assert_eq!(config.playback_total_frames, 199);
        assert_eq!(config.jpeg_quality, 90);
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("BACKEND_URL", "http://10.0.0.2:5000"),
            ("PORT", "9000"),
            ("CAMERA_SOURCE", "file:/tmp/frame.png"),
            ("INITIAL_MODE", "sam2"),
            ("PLAYBACK_TOTAL_FRAMES", "50"),
            ("JPEG_QUALITY", "75"),
            ("STATIC_DIR", "/srv/ui"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(
            config.camera_source,
            CameraSource::StillImage(PathBuf::from("/tmp/frame.png"))
        );
        assert_eq!(config.initial_mode, TrackingMode::Sam2);

        let controller = config.controller_config();
        assert_eq!(controller.playback.total_frames, 50);
        assert_eq!(controller.capture.jpeg_quality, 75);
        assert_eq!(config.static_dir, Some(PathBuf::from("/srv/ui")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for pairs in [
            vec![("INITIAL_MODE", "stereo")],
            vec![("PORT", "http")],
            vec![("CAPTURE_INTERVAL_MS", "0")],
            vec![("PLAYBACK_TOTAL_FRAMES", "0")],
            vec![("JPEG_QUALITY", "0")],
            vec![("JPEG_QUALITY", "101")],
        ] {
            assert!(
                matches!(config_from(&pairs), Err(Error::Config(_))),
                "{:?} should be rejected",
                pairs
            );
        }
    }
}

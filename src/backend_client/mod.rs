//! BackendClient - Tracking backend communication adapter
//!
//! ## Responsibilities
//!
//! - Upload live frames for per-mode processing
//! - Fetch precomputed playback frames (cache-busted)
//! - Notify the backend of the active mode (best-effort)
//!
//! Endpoint paths are fixed by the backend:
//!
//! - `POST /module/6/process_frame/{mode}` (multipart field `frame`)
//! - `GET  /module/6/sam2_frame/{index}`
//! - `GET  /module/6/set_mode/{mode}`

use crate::error::{Error, Result};
use crate::models::TrackingMode;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Backend operations used by the tracking controller
#[async_trait]
pub trait TrackingBackend: Send + Sync {
    /// Upload one JPEG frame, returns the processed image bytes
    async fn process_frame(&self, mode: TrackingMode, jpeg: Vec<u8>) -> Result<Vec<u8>>;

    /// Fetch the precomputed playback frame at `index`
    async fn fetch_playback_frame(&self, index: usize) -> Result<Vec<u8>>;

    /// Tell the backend which mode is active
    async fn set_mode(&self, mode: TrackingMode) -> Result<()>;
}

/// HTTP backend client
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create new backend client
    pub fn new(base_url: String) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create new backend client with custom timeout
    pub fn with_timeout(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check whether the backend answers at all
    pub async fn health_check(&self) -> bool {
        match self.client.get(&self.base_url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(base_url = %self.base_url, error = %e, "Backend not reachable");
                false
            }
        }
    }

    pub fn process_frame_url(&self, mode: TrackingMode) -> String {
        format!("{}/module/6/process_frame/{}", self.base_url, mode)
    }

    /// Playback frame URL with a cache-busting query
    pub fn playback_frame_url(&self, index: usize, cache_bust: i64) -> String {
        format!("{}/module/6/sam2_frame/{}?t={}", self.base_url, index, cache_bust)
    }

    pub fn set_mode_url(&self, mode: TrackingMode) -> String {
        format!("{}/module/6/set_mode/{}", self.base_url, mode)
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TrackingBackend for BackendClient {
    async fn process_frame(&self, mode: TrackingMode, jpeg: Vec<u8>) -> Result<Vec<u8>> {
        let url = self.process_frame_url(mode);

        let form = Form::new().part(
            "frame",
            Part::bytes(jpeg)
                .file_name("frame.jpg")
                .mime_str("image/jpeg")?,
        );

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::UploadRejected {
                status: resp.status().as_u16(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))?;
        Ok(body.to_vec())
    }

    async fn fetch_playback_frame(&self, index: usize) -> Result<Vec<u8>> {
        let url = self.playback_frame_url(index, chrono::Utc::now().timestamp_millis());
        let failed = |reason: String| Error::PlaybackFetchFailed {
            frame: index,
            reason,
        };

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(failed(format!("HTTP {}", resp.status())));
        }

        let body = resp.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(body.to_vec())
    }

    async fn set_mode(&self, mode: TrackingMode) -> Result<()> {
        let url = self.set_mode_url(mode);
        self.client.get(&url).send().await?;
        Ok(())
    }
}

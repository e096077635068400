//! Shared models and types
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tracking mode
///
/// `Marker` and `Markerless` sample the local camera; `Sam2` plays back
/// precomputed segmentation frames from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    #[default]
    Marker,
    Markerless,
    Sam2,
}

impl TrackingMode {
    /// Identifier used in backend paths
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::Marker => "marker",
            TrackingMode::Markerless => "markerless",
            TrackingMode::Sam2 => "sam2",
        }
    }

    /// Live modes continuously sample the camera
    pub fn is_live(&self) -> bool {
        !matches!(self, TrackingMode::Sam2)
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "marker" => Ok(TrackingMode::Marker),
            "markerless" => Ok(TrackingMode::Markerless),
            "sam2" => Ok(TrackingMode::Sam2),
            other => Err(Error::Validation(format!(
                "Unknown tracking mode '{}' (expected marker, markerless or sam2)",
                other
            ))),
        }
    }
}

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub mode: TrackingMode,
    pub backend_connected: bool,
    pub viewers: u64,
}

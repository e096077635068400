//! Error handling for the live tracker

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
///
/// The `Display` text of the domain variants is what the status surface
/// shows, so it is written for the person in front of the screen.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No capture backend exists in this runtime
    #[error("Camera capture is not available on this system.")]
    CapabilityUnavailable,

    /// The capture device refused access
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    /// The capture device could not be opened (busy, missing, timed out)
    #[error("Could not access camera: {0}")]
    AcquisitionFailed(String),

    /// Frame upload failed before a response arrived
    #[error("Processing error: {0}")]
    UploadFailed(String),

    /// Backend answered a frame upload with a non-success status
    #[error("Processing error ({status})")]
    UploadRejected { status: u16 },

    /// A playback frame could not be loaded
    #[error("Could not load playback frame {frame}: {reason}")]
    PlaybackFetchFailed { frame: usize, reason: String },

    /// Frame could not be encoded for upload
    #[error("Frame encoding failed: {0}")]
    Encode(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not allowed in the current mode
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the camera acquisition family of errors
    pub fn is_camera_error(&self) -> bool {
        matches!(
            self,
            Error::CapabilityUnavailable | Error::PermissionDenied(_) | Error::AcquisitionFailed(_)
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Error::CapabilityUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "CAPABILITY_UNAVAILABLE")
            }
            Error::PermissionDenied(_) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            Error::AcquisitionFailed(_) => (StatusCode::SERVICE_UNAVAILABLE, "ACQUISITION_FAILED"),
            Error::UploadFailed(_) => (StatusCode::BAD_GATEWAY, "UPLOAD_FAILED"),
            Error::UploadRejected { .. } => (StatusCode::BAD_GATEWAY, "UPLOAD_REJECTED"),
            Error::PlaybackFetchFailed { .. } => (StatusCode::BAD_GATEWAY, "PLAYBACK_FETCH_FAILED"),
            Error::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODE_ERROR"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let message = self.to_string();

        tracing::warn!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_messages_match_status_surface_text() {
        assert_eq!(
            Error::UploadRejected { status: 500 }.to_string(),
            "Processing error (500)"
        );
        assert_eq!(
            Error::UploadFailed("connection refused".to_string()).to_string(),
            "Processing error: connection refused"
        );
    }

    #[test]
    fn test_camera_error_family() {
        assert!(Error::CapabilityUnavailable.is_camera_error());
        assert!(Error::AcquisitionFailed("busy".into()).is_camera_error());
        assert!(!Error::UploadRejected { status: 502 }.is_camera_error());
    }

    #[test]
    fn test_into_response_status() {
        let resp = Error::Conflict("not in sam2".into()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = Error::CapabilityUnavailable.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

//! Error types and handling
//!
//! Common error types used across the capture and recording layers.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while acquiring sources, composing streams or recording
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No source available: {0}")]
    NoSourceAvailable(String),

    #[error("Remote peer delivered no audio track")]
    NoTrack,

    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Composite stream is closed")]
    CompositeClosed,

    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Recorder produced no payload")]
    ArtifactUnavailable,

    #[error("Artifact {0} not found")]
    NotFound(usize),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CaptureError {
    /// Stable code handed to the UI layer
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied(_) => "PERMISSION_DENIED",
            CaptureError::NoSourceAvailable(_) => "NO_SOURCE_AVAILABLE",
            CaptureError::NoTrack => "NO_TRACK",
            CaptureError::Timeout(_) => "TIMEOUT",
            CaptureError::CompositeClosed => "COMPOSITE_CLOSED",
            CaptureError::InvalidTrack(_) => "INVALID_TRACK",
            CaptureError::AlreadyRecording => "ALREADY_RECORDING",
            CaptureError::NotRecording => "NOT_RECORDING",
            CaptureError::ArtifactUnavailable => "ARTIFACT_UNAVAILABLE",
            CaptureError::NotFound(_) => "NOT_FOUND",
            CaptureError::Configuration(_) => "CONFIGURATION_ERROR",
            CaptureError::Platform(_) => "PLATFORM_ERROR",
            CaptureError::Io(_) => "IO_ERROR",
            CaptureError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether this failure should be shown to the user as a notice.
    ///
    /// Notices are non-fatal; nothing is retried automatically.
    pub fn is_user_notice(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied(_)
                | CaptureError::NoSourceAvailable(_)
                | CaptureError::NoTrack
        )
    }
}

/// Error response for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&CaptureError> for ErrorResponse {
    fn from(error: &CaptureError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<CaptureError> for ErrorResponse {
    fn from(error: CaptureError) -> Self {
        ErrorResponse::from(&error)
    }
}

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response = ErrorResponse::from(CaptureError::PermissionDenied("display".into()));
        assert_eq!(response.code, "PERMISSION_DENIED");
        assert_eq!(response.message, "Permission denied: display");

        let response = ErrorResponse::from(&CaptureError::Timeout(Duration::from_millis(5000)));
        assert_eq!(response.code, "TIMEOUT");
        assert_eq!(response.message, "Timed out after 5000ms");
    }

    #[test]
    fn test_user_notices() {
        assert!(CaptureError::PermissionDenied("mic".into()).is_user_notice());
        assert!(CaptureError::NoTrack.is_user_notice());
        assert!(!CaptureError::AlreadyRecording.is_user_notice());
        assert!(!CaptureError::CompositeClosed.is_user_notice());
    }

    #[test]
    fn test_error_response_serializes_camel_case() {
        let response = ErrorResponse::from(CaptureError::NotFound(3));
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"code":"NOT_FOUND","message":"Artifact 3 not found"}"#);
    }
}

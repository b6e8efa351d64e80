//! Error types and handling
//!
//! Common error types used across the recording pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which capture source an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Screen,
    Camera,
    Microphone,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Screen => write!(f, "screen"),
            SourceKind::Camera => write!(f, "camera"),
            SourceKind::Microphone => write!(f, "microphone"),
        }
    }
}

impl std::error::Error for SourceKind {}

/// Errors that can occur during a recording session
#[derive(Error, Debug)]
pub enum RecordingError {
    /// Device enumeration failed (platform API unavailable)
    #[error("Device enumeration unavailable: {0}")]
    DeviceUnavailable(String),

    /// Permission refused or device busy
    #[error("Could not access {source}: {reason}")]
    AcquisitionDenied { source: SourceKind, reason: String },

    /// No encoder configuration in the fallback cascade was accepted
    #[error("No supported encoder configuration")]
    Unsupported,

    /// Stop produced zero output fragments
    #[error("Recording produced no data")]
    EmptyRecording,

    /// Fragment assembly failed at finalize
    #[error("Failed to finalize recording: {0}")]
    FinalizeFailed(String),

    /// Mid-session encoder fault
    #[error("Encoder error: {0}")]
    EncoderRuntime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecordingError {
    /// Stable code for the frontend, mirroring the error kind
    pub fn code(&self) -> &'static str {
        match self {
            RecordingError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            RecordingError::AcquisitionDenied { .. } => "ACQUISITION_DENIED",
            RecordingError::Unsupported => "UNSUPPORTED",
            RecordingError::EmptyRecording => "EMPTY_RECORDING",
            RecordingError::FinalizeFailed(_) => "FINALIZE_FAILED",
            RecordingError::EncoderRuntime(_) => "ENCODER_RUNTIME",
            RecordingError::Io(_) => "IO_ERROR",
        }
    }

    pub fn denied(source: SourceKind, reason: impl Into<String>) -> Self {
        RecordingError::AcquisitionDenied {
            source,
            reason: reason.into(),
        }
    }
}

/// Error response for frontend consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&RecordingError> for ErrorResponse {
    fn from(error: &RecordingError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

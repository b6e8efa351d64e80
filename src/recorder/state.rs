//! Recording state types
//!
//! Defines the session status, start configuration, and the published
//! snapshot consumed by UI collaborators.

use crate::artifact::ArtifactInfo;
use crate::encoder::config::EncoderConfig;
use crate::error::ErrorResponse;
use serde::{Deserialize, Serialize};

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// No session, no open streams
    Idle,
    /// Sources are being acquired or held for preview
    Connecting,
    /// Currently recording
    Recording,
    /// Recording is paused; sources stay open for a fast resume
    Paused,
    /// Session completed, artifact or error attached
    Stopped,
}

impl Default for RecordingStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Configuration for starting a recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Whether to capture the camera (optional source: failure degrades)
    pub record_camera: bool,

    /// Whether to capture the microphone (load-bearing: failure aborts)
    pub record_microphone: bool,

    /// Camera device ID (registry selection when absent)
    pub camera_device_id: Option<String>,

    /// Microphone device ID (registry selection when absent)
    pub microphone_device_id: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            record_camera: true,
            record_microphone: true,
            camera_device_id: None,
            microphone_device_id: None,
        }
    }
}

/// Read-only view of the session for UI consumers
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: RecordingStatus,

    /// Elapsed recording time, paused intervals excluded
    pub duration_ms: f64,

    /// Metadata of the completed artifact (body via the publisher)
    pub artifact: Option<ArtifactInfo>,

    /// The encoder configuration the cascade settled on
    pub selected_config: Option<EncoderConfig>,

    pub error: Option<ErrorResponse>,

    /// Non-fatal warnings (e.g. a busy camera that was skipped)
    pub warnings: Vec<String>,
}

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Recording started
    Started,
    /// Recording stopped
    Stopped,
    /// Recording paused
    Paused,
    /// Recording resumed
    Resumed,
    /// Non-fatal warning
    Warning(String),
    /// Error occurred
    Error(String),
    /// Recording progress update (duration in ms)
    Progress(f64),
}

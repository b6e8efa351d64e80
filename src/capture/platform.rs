//! Capture platform boundary
//!
//! Platform-agnostic trait for acquiring screen, camera, and microphone
//! streams. Hosts provide an implementation (OS capture APIs, a browser
//! bridge, a test double); the recording core only ever talks to this
//! trait.

use crate::capture::stream::MediaStream;
use crate::error::RecordingResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Kind of an enumerable input device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Camera,
    Microphone,
}

/// Information about an enumerable input device
///
/// Labels are only populated once the platform has granted permission for
/// the corresponding kind; before that they may be empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Unique device ID
    pub id: String,

    /// Human-readable device label
    pub label: String,

    /// Device kind
    pub kind: DeviceKind,
}

/// Options for a screen acquisition
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenCaptureOptions {
    /// Request system/tab audio alongside the video track.
    ///
    /// Inclusion is best-effort: the platform may reject audio capture, in
    /// which case the caller retries video-only.
    pub system_audio: bool,
}

/// Platform seam for device enumeration and stream acquisition
#[async_trait]
pub trait CapturePlatform: Send + Sync {
    /// Enumerate available camera and microphone devices
    async fn enumerate_devices(&self) -> RecordingResult<Vec<DeviceDescriptor>>;

    /// Acquire a screen/window capture stream
    async fn acquire_screen(&self, options: ScreenCaptureOptions) -> RecordingResult<MediaStream>;

    /// Acquire a camera stream, by device id or platform default
    async fn acquire_camera(&self, device_id: Option<&str>) -> RecordingResult<MediaStream>;

    /// Acquire a microphone stream, by device id or platform default
    async fn acquire_microphone(&self, device_id: Option<&str>) -> RecordingResult<MediaStream>;

    /// Subscribe to device-change notifications.
    ///
    /// The default implementation never fires; platforms with hotplug
    /// support override it.
    fn device_changes(&self) -> broadcast::Receiver<()> {
        broadcast::channel(1).1
    }
}

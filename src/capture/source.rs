//! Capture sources
//!
//! One acquire/release unit per input kind (screen, camera, microphone).
//! Each source owns zero or one platform stream at a time; reconnecting
//! releases the previous stream before acquiring the next.

use crate::capture::platform::{CapturePlatform, ScreenCaptureOptions};
use crate::capture::stream::{AudioHandle, FrameHandle, MediaStream};
use crate::error::{RecordingResult, SourceKind};

/// An owned wrapper around one platform input stream
pub struct CaptureSource {
    kind: SourceKind,
    stream: Option<MediaStream>,
    enabled: bool,
}

impl CaptureSource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            stream: None,
            enabled: true,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether this source participates in composition/mixing.
    /// A disabled source can stay connected (fast re-enable) without its
    /// frames or audio being consumed.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn stream(&self) -> Option<&MediaStream> {
        self.stream.as_ref()
    }

    /// Acquire a stream for this source.
    ///
    /// For the screen, system-audio inclusion is best-effort: when the
    /// platform rejects the audio-inclusive request the acquisition is
    /// retried video-only. `device_id` applies to camera/microphone only.
    pub async fn connect(
        &mut self,
        platform: &dyn CapturePlatform,
        device_id: Option<&str>,
    ) -> RecordingResult<()> {
        if self.stream.is_some() {
            tracing::debug!("Reconnecting {} source, releasing previous stream", self.kind);
            self.disconnect();
        }

        let stream = match self.kind {
            SourceKind::Screen => {
                match platform
                    .acquire_screen(ScreenCaptureOptions { system_audio: true })
                    .await
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::warn!(
                            "Screen capture with system audio rejected ({}), retrying video-only",
                            e
                        );
                        platform
                            .acquire_screen(ScreenCaptureOptions {
                                system_audio: false,
                            })
                            .await?
                    }
                }
            }
            SourceKind::Camera => platform.acquire_camera(device_id).await?,
            SourceKind::Microphone => platform.acquire_microphone(device_id).await?,
        };

        tracing::info!(
            "Connected {} source (stream {}, {} tracks)",
            self.kind,
            stream.id(),
            stream.tracks().len()
        );
        self.stream = Some(stream);
        Ok(())
    }

    /// Release the current stream, stopping all of its tracks. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop_all();
            tracing::info!("Disconnected {} source (stream {})", self.kind, stream.id());
        }
    }

    /// Current-frame handle of the stream's video track
    pub fn frame_handle(&self) -> Option<FrameHandle> {
        self.stream
            .as_ref()
            .and_then(|s| s.video_track())
            .and_then(|t| t.frames())
    }

    /// Chunk subscription of the stream's audio track
    pub fn audio_handle(&self) -> Option<AudioHandle> {
        self.stream
            .as_ref()
            .and_then(|s| s.audio_track())
            .and_then(|t| t.audio())
    }

    /// Ended notification of the stream's video track (used for the
    /// screen source's platform-driven termination)
    pub fn video_ended(&self) -> Option<tokio::sync::watch::Receiver<bool>> {
        self.stream
            .as_ref()
            .and_then(|s| s.video_track())
            .map(|t| t.ended())
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.disconnect();
    }
}

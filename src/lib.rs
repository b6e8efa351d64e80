//! Framecast - screen recordings with a face-camera overlay, made simple.
//!
//! This crate implements the capture-and-compose pipeline of a screen
//! recorder: it acquires screen, camera, and microphone streams through
//! a platform seam, composites them in real time, mixes the audio, and
//! drives an encoder through a fallback cascade into a downloadable
//! artifact, all behind a small recording state machine.

pub mod artifact;
pub mod capture;
pub mod compositor;
pub mod encoder;
pub mod error;
pub mod mixer;
pub mod recorder;

pub use artifact::{Artifact, ArtifactInfo};
pub use capture::{CapturePlatform, CaptureSource, DeviceRegistry};
pub use compositor::{CompositorConfig, FrameCompositor, OverlayAnchor, OverlayShape};
pub use encoder::{EncoderBackend, EncoderConfig, EncoderSession, FfmpegEncoderBackend};
pub use error::{RecordingError, RecordingResult, SourceKind};
pub use mixer::{AudioMixer, MixerConfig};
pub use recorder::{
    RecordingSession, RecordingStatus, SessionConfig, SessionPublisher, SessionSnapshot,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for hosts that don't bring their own
/// subscriber. Safe to call once per process.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "framecast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Framecast v{}", env!("CARGO_PKG_VERSION"));
}

//! Encoder platform boundary
//!
//! Backends accept or reject configurations (driving the fallback
//! cascade) and hand out a handle that consumes the composited video
//! feed plus the mixed audio feed, emitting output fragments
//! periodically rather than in one end-of-session flush.

use crate::capture::stream::{AudioChunk, VideoFrame};
use crate::encoder::config::EncoderConfig;
use crate::error::RecordingResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// One binary output fragment
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Position in the output sequence
    pub sequence: u64,

    /// Encoded bytes
    pub data: Vec<u8>,

    /// Emission time in milliseconds since encoder start
    pub timestamp_ms: f64,
}

/// Input feeds and stream parameters for one encoder session
pub struct EncoderInputs {
    /// Composited video frames (packed BGRA)
    pub video: broadcast::Receiver<Arc<VideoFrame>>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Nominal frame rate
    pub frame_rate: u32,

    /// Mixed audio, absent when no audio input was connected
    pub audio: Option<broadcast::Receiver<Arc<AudioChunk>>>,

    /// Audio sample rate in Hz
    pub sample_rate: u32,

    /// Audio channel count
    pub channels: u16,
}

/// What finalize reports back
pub struct EncodedOutput {
    /// The media type actually produced. May differ from the requested
    /// configuration when the platform silently fell back.
    pub media_type: String,

    /// A fully assembled artifact body, when the backend muxes its own
    /// container at finalize. `None` means the ordered fragments ARE the
    /// artifact.
    pub finalized: Option<Vec<u8>>,
}

/// A running encoder
#[async_trait]
pub trait EncoderHandle: Send {
    /// Take the periodic fragment feed. Yields `None` after the first
    /// call.
    fn fragments(&mut self) -> Option<mpsc::Receiver<Fragment>>;

    /// Suspend consumption of the input feeds
    async fn pause(&mut self) -> RecordingResult<()>;

    /// Resume consumption
    async fn resume(&mut self) -> RecordingResult<()>;

    /// Flush buffered data, close the fragment feed, and report the
    /// actually-produced media type.
    async fn finalize(&mut self) -> RecordingResult<EncodedOutput>;
}

/// Factory for encoder handles
#[async_trait]
pub trait EncoderBackend: Send + Sync {
    /// Whether this configuration can be encoded. Used to drive the
    /// fallback cascade without relying on creation failures.
    async fn is_configuration_supported(&self, config: &EncoderConfig) -> bool;

    /// Create a running encoder for the given inputs
    async fn create(
        &self,
        inputs: EncoderInputs,
        config: &EncoderConfig,
    ) -> RecordingResult<Box<dyn EncoderHandle>>;
}

//! Encoding: configuration cascade, platform boundary, and session
//!
//! - `config` — configurations and the ordered fallback cascade
//! - `backend` — the `EncoderBackend`/`EncoderHandle` seam
//! - `session` — fragment accumulation and artifact assembly
//! - `ffmpeg` — the ffmpeg-CLI backend

pub mod backend;
pub mod config;
pub mod ffmpeg;
pub mod session;

pub use backend::{EncodedOutput, EncoderBackend, EncoderHandle, EncoderInputs, Fragment};
pub use config::{
    default_cascade, negotiate, AudioCodec, ContainerFormat, EncoderConfig, VideoCodec,
};
pub use ffmpeg::FfmpegEncoderBackend;
pub use session::EncoderSession;

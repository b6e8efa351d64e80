//! Encoding configuration and the fallback cascade
//!
//! Codec/container negotiation is an ordered retry over decreasing
//! quality/compatibility: the first configuration the backend accepts is
//! used, and exhaustion surfaces `Unsupported`. The same negotiation
//! shape is reusable by downstream transcode features.

use crate::encoder::backend::EncoderBackend;
use crate::error::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp4,
    Webm,
}

impl ContainerFormat {
    /// File extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Webm => "webm",
        }
    }

    /// Base media type for this container
    pub fn base_media_type(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::Webm => "video/webm",
        }
    }
}

/// Video codec choices across the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Vp9,
    Vp8,
}

impl VideoCodec {
    /// Codec tag used in the declared media type
    pub fn tag(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Vp8 => "vp8",
        }
    }

    /// FFmpeg encoder name for this codec
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Vp8 => "libvpx",
        }
    }
}

/// Audio codec choices across the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
}

impl AudioCodec {
    pub fn tag(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Opus => "opus",
        }
    }

    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Opus => "libopus",
        }
    }
}

/// One encoder configuration tried by the cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderConfig {
    pub container: ContainerFormat,
    pub video_codec: VideoCodec,
    /// None means video-only
    pub audio_codec: Option<AudioCodec>,
    /// Video bitrate in bits per second
    pub video_bitrate: u32,
    /// Audio bitrate in bits per second
    pub audio_bitrate: u32,
}

impl EncoderConfig {
    /// Declared media type, including codec tags
    pub fn media_type(&self) -> String {
        match self.audio_codec {
            Some(audio) => format!(
                "{};codecs={},{}",
                self.container.base_media_type(),
                self.video_codec.tag(),
                audio.tag()
            ),
            None => format!(
                "{};codecs={}",
                self.container.base_media_type(),
                self.video_codec.tag()
            ),
        }
    }

    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}

/// The default fallback cascade: high quality first, then progressively
/// wider compatibility, ending in a minimal video-only default.
pub fn default_cascade() -> Vec<EncoderConfig> {
    vec![
        EncoderConfig {
            container: ContainerFormat::Mp4,
            video_codec: VideoCodec::H264,
            audio_codec: Some(AudioCodec::Aac),
            video_bitrate: 8_000_000,
            audio_bitrate: 128_000,
        },
        EncoderConfig {
            container: ContainerFormat::Webm,
            video_codec: VideoCodec::Vp9,
            audio_codec: Some(AudioCodec::Opus),
            video_bitrate: 5_000_000,
            audio_bitrate: 128_000,
        },
        EncoderConfig {
            container: ContainerFormat::Webm,
            video_codec: VideoCodec::Vp8,
            audio_codec: Some(AudioCodec::Opus),
            video_bitrate: 2_500_000,
            audio_bitrate: 96_000,
        },
        EncoderConfig {
            container: ContainerFormat::Webm,
            video_codec: VideoCodec::Vp8,
            audio_codec: None,
            video_bitrate: 1_000_000,
            audio_bitrate: 0,
        },
        EncoderConfig {
            container: ContainerFormat::Webm,
            video_codec: VideoCodec::Vp8,
            audio_codec: None,
            video_bitrate: 250_000,
            audio_bitrate: 0,
        },
    ]
}

/// Walk the cascade in order and return the first configuration the
/// backend accepts. Unsupported entries are expected, not exceptional.
pub async fn negotiate(
    backend: &dyn EncoderBackend,
    cascade: &[EncoderConfig],
) -> RecordingResult<EncoderConfig> {
    for config in cascade {
        if backend.is_configuration_supported(config).await {
            tracing::info!("Negotiated encoder configuration: {}", config.media_type());
            return Ok(config.clone());
        }
        tracing::debug!(
            "Encoder configuration rejected, falling back: {}",
            config.media_type()
        );
    }
    tracing::error!("Encoder cascade exhausted, no configuration accepted");
    Err(RecordingError::Unsupported)
}

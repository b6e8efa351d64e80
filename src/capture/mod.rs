//! Capture sources and the platform boundary
//!
//! This module provides the platform-agnostic capture seam, the owned
//! stream/track model, the device registry, and the per-kind capture
//! sources built on top of them.

pub mod devices;
pub mod platform;
pub mod source;
pub mod stream;

#[cfg(feature = "native-devices")]
pub mod native;

pub use devices::DeviceRegistry;
pub use platform::{CapturePlatform, DeviceDescriptor, DeviceKind, ScreenCaptureOptions};
pub use source::CaptureSource;
pub use stream::{AudioChunk, AudioHandle, FrameHandle, MediaStream, MediaTrack, VideoFrame};

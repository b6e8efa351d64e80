//! Native device backend (feature `native-devices`)
//!
//! Camera access through nokhwa and microphone access through cpal.
//! Screen capture is not provided here: it needs an OS-specific capture
//! service and stays with the host's `CapturePlatform` implementation.

use crate::capture::platform::{
    CapturePlatform, DeviceDescriptor, DeviceKind, ScreenCaptureOptions,
};
use crate::capture::stream::{self, AudioChunk, MediaStream, TrackSource, VideoFrame};
use crate::error::{RecordingError, RecordingResult, SourceKind};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::time::Instant;

/// Capture platform backed by the machine's own camera and microphone.
pub struct NativeDevicePlatform;

impl NativeDevicePlatform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeDevicePlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapturePlatform for NativeDevicePlatform {
    async fn enumerate_devices(&self) -> RecordingResult<Vec<DeviceDescriptor>> {
        let mut devices = Vec::new();

        match nokhwa::query(ApiBackend::Auto) {
            Ok(cameras) => {
                for info in cameras {
                    let id = match info.index() {
                        CameraIndex::Index(i) => i.to_string(),
                        CameraIndex::String(s) => s.to_string(),
                    };
                    devices.push(DeviceDescriptor {
                        id,
                        label: info.human_name().to_string(),
                        kind: DeviceKind::Camera,
                    });
                }
            }
            Err(e) => {
                tracing::warn!("Failed to enumerate cameras: {:?}", e);
            }
        }

        let host = cpal::default_host();
        let inputs = host
            .input_devices()
            .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))?;
        for device in inputs {
            if let Ok(name) = device.name() {
                devices.push(DeviceDescriptor {
                    id: name.clone(),
                    label: name,
                    kind: DeviceKind::Microphone,
                });
            }
        }

        Ok(devices)
    }

    async fn acquire_screen(&self, _options: ScreenCaptureOptions) -> RecordingResult<MediaStream> {
        Err(RecordingError::DeviceUnavailable(
            "screen capture requires a host platform implementation".into(),
        ))
    }

    async fn acquire_camera(&self, device_id: Option<&str>) -> RecordingResult<MediaStream> {
        let index = match device_id {
            Some(id) => match id.parse::<u32>() {
                Ok(i) => CameraIndex::Index(i),
                Err(_) => CameraIndex::String(id.to_string()),
            },
            None => CameraIndex::Index(0),
        };

        let (track, source) = stream::video_track();
        let requested =
            RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        // Blocking open so acquisition failure is reported to the caller,
        // then a dedicated thread drives the frame loop.
        let mut camera = tokio::task::spawn_blocking(move || Camera::new(index, requested))
            .await
            .map_err(|e| RecordingError::denied(SourceKind::Camera, e.to_string()))?
            .map_err(|e| RecordingError::denied(SourceKind::Camera, e.to_string()))?;

        camera
            .open_stream()
            .map_err(|e| RecordingError::denied(SourceKind::Camera, e.to_string()))?;

        std::thread::spawn(move || camera_loop(camera, source));
        Ok(MediaStream::new(vec![track]))
    }

    async fn acquire_microphone(&self, device_id: Option<&str>) -> RecordingResult<MediaStream> {
        let host = cpal::default_host();
        let device = match device_id {
            Some(id) => host
                .input_devices()
                .map_err(|e| RecordingError::denied(SourceKind::Microphone, e.to_string()))?
                .find(|d| d.name().map(|n| n == id).unwrap_or(false))
                .ok_or_else(|| {
                    RecordingError::denied(SourceKind::Microphone, format!("no device '{id}'"))
                })?,
            None => host.default_input_device().ok_or_else(|| {
                RecordingError::denied(SourceKind::Microphone, "no default input device")
            })?,
        };

        let config = device
            .default_input_config()
            .map_err(|e| RecordingError::denied(SourceKind::Microphone, e.to_string()))?;

        let (track, source) = stream::audio_track();

        // cpal streams are not Send, so the stream lives on its own thread
        // for as long as the track does.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();
        std::thread::spawn(move || microphone_loop(device, config, source, ready_tx));

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(MediaStream::new(vec![track])),
            Ok(Err(e)) => Err(RecordingError::denied(SourceKind::Microphone, e)),
            Err(_) => Err(RecordingError::denied(
                SourceKind::Microphone,
                "microphone thread exited before the stream started",
            )),
        }
    }
}

fn camera_loop(mut camera: Camera, source: TrackSource) {
    let started = Instant::now();
    while !source.is_stopped() {
        match camera.frame() {
            Ok(frame) => match frame.decode_image::<RgbAFormat>() {
                Ok(decoded) => {
                    let (width, height) = (decoded.width(), decoded.height());
                    let mut data = decoded.into_raw();
                    // RGBA -> BGRA
                    for px in data.chunks_exact_mut(4) {
                        px.swap(0, 2);
                    }
                    source.push_frame(VideoFrame::packed(
                        data,
                        width,
                        height,
                        started.elapsed().as_secs_f64() * 1000.0,
                    ));
                }
                Err(e) => tracing::warn!("Failed to decode camera frame: {:?}", e),
            },
            Err(e) => {
                tracing::warn!("Camera frame error, ending track: {:?}", e);
                source.end();
                break;
            }
        }
    }
    let _ = camera.stop_stream();
}

fn microphone_loop(
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    source: TrackSource,
    ready_tx: std::sync::mpsc::Sender<Result<(), String>>,
) {
    let sample_rate = config.sample_rate().0;
    let channels = config.channels();
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();
    let started = Instant::now();

    let build = |source: TrackSource| -> Result<cpal::Stream, cpal::BuildStreamError> {
        let err_fn = |err| tracing::warn!("Microphone stream error (non-fatal): {}", err);
        match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    source.push_chunk(AudioChunk {
                        samples: data.to_vec(),
                        sample_rate,
                        channels,
                        timestamp_ms: started.elapsed().as_secs_f64() * 1000.0,
                    });
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples = data
                        .iter()
                        .map(|&s| s as f32 / i16::MAX as f32)
                        .collect::<Vec<_>>();
                    source.push_chunk(AudioChunk {
                        samples,
                        sample_rate,
                        channels,
                        timestamp_ms: started.elapsed().as_secs_f64() * 1000.0,
                    });
                },
                err_fn,
                None,
            ),
            other => {
                tracing::warn!("Unsupported microphone sample format {:?}", other);
                return Err(cpal::BuildStreamError::StreamConfigNotSupported);
            }
        }
    };

    let stream = match build(source.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.to_string()));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    while !source.is_stopped() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    drop(stream);
}

//! Mock infrastructure for testing
//!
//! Scriptable capture platform and encoder backend, plus frame/chunk
//! constructors and open-stream accounting for leak assertions.
#![allow(dead_code)]

use async_trait::async_trait;
use framecast::capture::platform::{
    CapturePlatform, DeviceDescriptor, DeviceKind, ScreenCaptureOptions,
};
use framecast::capture::stream::{
    self, AudioChunk, MediaStream, TrackSource, VideoFrame,
};
use framecast::encoder::backend::{
    EncodedOutput, EncoderBackend, EncoderHandle, EncoderInputs, Fragment,
};
use framecast::encoder::config::EncoderConfig;
use framecast::error::{RecordingError, RecordingResult, SourceKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Create a solid-color BGRA test frame
pub fn test_frame(width: u32, height: u32, color: [u8; 4]) -> VideoFrame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..width * height {
        data.extend_from_slice(&color);
    }
    VideoFrame::packed(data, width, height, 0.0)
}

/// Create a short audio chunk
pub fn test_chunk(value: f32, len: usize) -> AudioChunk {
    AudioChunk {
        samples: vec![value; len],
        sample_rate: 48000,
        channels: 2,
        timestamp_ms: 0.0,
    }
}

struct MockStream {
    kind: SourceKind,
    tracks: Vec<TrackSource>,
}

impl MockStream {
    fn is_open(&self) -> bool {
        self.tracks.iter().any(|t| !t.is_stopped())
    }
}

/// Scriptable capture platform
pub struct MockPlatform {
    pub deny_screen: AtomicBool,
    pub deny_screen_audio: AtomicBool,
    pub deny_camera: AtomicBool,
    pub deny_microphone: AtomicBool,
    pub fail_enumeration: AtomicBool,
    streams: Mutex<Vec<MockStream>>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deny_screen: AtomicBool::new(false),
            deny_screen_audio: AtomicBool::new(false),
            deny_camera: AtomicBool::new(false),
            deny_microphone: AtomicBool::new(false),
            fail_enumeration: AtomicBool::new(false),
            streams: Mutex::new(Vec::new()),
        })
    }

    /// Streams whose tracks are not all stopped
    pub fn open_stream_count(&self) -> usize {
        self.streams.lock().iter().filter(|s| s.is_open()).count()
    }

    pub fn acquisition_count(&self, kind: SourceKind) -> usize {
        self.streams.lock().iter().filter(|s| s.kind == kind).count()
    }

    /// Push a frame into every live screen video track
    pub fn push_screen_frame(&self, frame: VideoFrame) {
        for stream in self.streams.lock().iter() {
            if stream.kind == SourceKind::Screen {
                for track in &stream.tracks {
                    track.push_frame(frame.clone());
                }
            }
        }
    }

    /// Push an audio chunk into every live microphone track
    pub fn push_mic_chunk(&self, chunk: AudioChunk) {
        for stream in self.streams.lock().iter() {
            if stream.kind == SourceKind::Microphone {
                for track in &stream.tracks {
                    track.push_chunk(chunk.clone());
                }
            }
        }
    }

    /// Simulate the user hitting the platform's native "stop sharing"
    pub fn end_screen_share(&self) {
        for stream in self.streams.lock().iter() {
            if stream.kind == SourceKind::Screen {
                for track in &stream.tracks {
                    track.end();
                }
            }
        }
    }
}

#[async_trait]
impl CapturePlatform for MockPlatform {
    async fn enumerate_devices(&self) -> RecordingResult<Vec<DeviceDescriptor>> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(RecordingError::DeviceUnavailable("mock outage".into()));
        }
        Ok(vec![
            DeviceDescriptor {
                id: "mock-cam".into(),
                label: "Mock Camera".into(),
                kind: DeviceKind::Camera,
            },
            DeviceDescriptor {
                id: "mock-mic".into(),
                label: "Mock Microphone".into(),
                kind: DeviceKind::Microphone,
            },
        ])
    }

    async fn acquire_screen(&self, options: ScreenCaptureOptions) -> RecordingResult<MediaStream> {
        if self.deny_screen.load(Ordering::SeqCst) {
            return Err(RecordingError::denied(SourceKind::Screen, "denied"));
        }
        if options.system_audio && self.deny_screen_audio.load(Ordering::SeqCst) {
            return Err(RecordingError::denied(
                SourceKind::Screen,
                "system audio rejected",
            ));
        }

        let (video, video_src) = stream::video_track();
        let mut tracks = vec![video];
        let mut sources = vec![video_src];
        if options.system_audio {
            let (audio, audio_src) = stream::audio_track();
            tracks.push(audio);
            sources.push(audio_src);
        }
        self.streams.lock().push(MockStream {
            kind: SourceKind::Screen,
            tracks: sources,
        });
        Ok(MediaStream::new(tracks))
    }

    async fn acquire_camera(&self, _device_id: Option<&str>) -> RecordingResult<MediaStream> {
        if self.deny_camera.load(Ordering::SeqCst) {
            return Err(RecordingError::denied(
                SourceKind::Camera,
                "device may be in use",
            ));
        }
        let (video, video_src) = stream::video_track();
        self.streams.lock().push(MockStream {
            kind: SourceKind::Camera,
            tracks: vec![video_src],
        });
        Ok(MediaStream::new(vec![video]))
    }

    async fn acquire_microphone(&self, _device_id: Option<&str>) -> RecordingResult<MediaStream> {
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(RecordingError::denied(
                SourceKind::Microphone,
                "device may be in use",
            ));
        }
        let (audio, audio_src) = stream::audio_track();
        self.streams.lock().push(MockStream {
            kind: SourceKind::Microphone,
            tracks: vec![audio_src],
        });
        Ok(MediaStream::new(vec![audio]))
    }
}

type SupportPredicate = Box<dyn Fn(&EncoderConfig) -> bool + Send + Sync>;

/// Scriptable encoder backend
pub struct MockEncoderBackend {
    supported: SupportPredicate,
    emit_fragments: bool,
    created: Mutex<Vec<EncoderConfig>>,
}

impl MockEncoderBackend {
    pub fn accept_all() -> Arc<Self> {
        Arc::new(Self {
            supported: Box::new(|_| true),
            emit_fragments: true,
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn reject_all() -> Arc<Self> {
        Arc::new(Self {
            supported: Box::new(|_| false),
            emit_fragments: true,
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn accept_when(pred: impl Fn(&EncoderConfig) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            supported: Box::new(pred),
            emit_fragments: true,
            created: Mutex::new(Vec::new()),
        })
    }

    /// Accepts everything but never emits a fragment
    pub fn silent() -> Arc<Self> {
        Arc::new(Self {
            supported: Box::new(|_| true),
            emit_fragments: false,
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn created_configs(&self) -> Vec<EncoderConfig> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl EncoderBackend for MockEncoderBackend {
    async fn is_configuration_supported(&self, config: &EncoderConfig) -> bool {
        (self.supported)(config)
    }

    async fn create(
        &self,
        inputs: EncoderInputs,
        config: &EncoderConfig,
    ) -> RecordingResult<Box<dyn EncoderHandle>> {
        self.created.lock().push(config.clone());

        let paused = Arc::new(AtomicBool::new(false));
        let (fragments_tx, fragments_rx) = mpsc::channel(64);
        let emit = self.emit_fragments;

        let task = {
            let paused = Arc::clone(&paused);
            let mut video = inputs.video;
            tokio::spawn(async move {
                let started = Instant::now();
                let mut sequence = 0u64;
                loop {
                    match video.recv().await {
                        Ok(_frame) => {
                            if paused.load(Ordering::Relaxed) || !emit {
                                continue;
                            }
                            let fragment = Fragment {
                                sequence,
                                data: vec![sequence as u8; 4],
                                timestamp_ms: started.elapsed().as_secs_f64() * 1000.0,
                            };
                            sequence += 1;
                            if fragments_tx.send(fragment).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        Ok(Box::new(MockEncoderHandle {
            config: config.clone(),
            paused,
            fragments_rx: Some(fragments_rx),
            task: Some(task),
        }))
    }
}

struct MockEncoderHandle {
    config: EncoderConfig,
    paused: Arc<AtomicBool>,
    fragments_rx: Option<mpsc::Receiver<Fragment>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl EncoderHandle for MockEncoderHandle {
    fn fragments(&mut self) -> Option<mpsc::Receiver<Fragment>> {
        self.fragments_rx.take()
    }

    async fn pause(&mut self) -> RecordingResult<()> {
        self.paused.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn resume(&mut self) -> RecordingResult<()> {
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn finalize(&mut self) -> RecordingResult<EncodedOutput> {
        // Aborting the feed task drops the fragment sender, closing the
        // feed the way a real flush does.
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        Ok(EncodedOutput {
            media_type: self.config.media_type(),
            finalized: None,
        })
    }
}

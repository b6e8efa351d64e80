//! Media stream and track ownership
//!
//! A `MediaStream` owns the tracks produced by one platform acquisition.
//! Consumers (compositor, mixer, encoder) never hold the stream itself:
//! video tracks hand out a current-frame handle and audio tracks a chunk
//! subscription, so a stream can be released without dangling references.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// One decoded video frame (BGRA)
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw pixel data (BGRA format)
    pub data: Vec<u8>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Bytes per row (may include padding)
    pub bytes_per_row: u32,

    /// Timestamp in milliseconds (process time)
    pub timestamp_ms: f64,
}

impl VideoFrame {
    /// Create a frame with tightly packed rows
    pub fn packed(data: Vec<u8>, width: u32, height: u32, timestamp_ms: f64) -> Self {
        Self {
            data,
            width,
            height,
            bytes_per_row: width * 4,
            timestamp_ms,
        }
    }
}

/// One chunk of interleaved audio samples
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved f32 samples
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count
    pub channels: u16,

    /// Timestamp in milliseconds (process time)
    pub timestamp_ms: f64,
}

/// Track payload kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Receiver over a video track's current frame.
///
/// `None` until the first frame is decodable.
pub type FrameHandle = watch::Receiver<Option<Arc<VideoFrame>>>;

/// Receiver over an audio track's chunk feed
pub type AudioHandle = broadcast::Receiver<Arc<AudioChunk>>;

enum TrackFeed {
    Video(watch::Sender<Option<Arc<VideoFrame>>>),
    Audio(broadcast::Sender<Arc<AudioChunk>>),
}

struct TrackShared {
    id: String,
    kind: TrackKind,
    feed: TrackFeed,
    ended_tx: watch::Sender<bool>,
    stopped: AtomicBool,
}

/// Consumer half of a track
#[derive(Clone)]
pub struct MediaTrack {
    shared: Arc<TrackShared>,
}

/// Producer half of a track, held by the platform capture loop
#[derive(Clone)]
pub struct TrackSource {
    shared: Arc<TrackShared>,
}

fn new_track(kind: TrackKind) -> (MediaTrack, TrackSource) {
    let feed = match kind {
        TrackKind::Video => TrackFeed::Video(watch::channel(None).0),
        TrackKind::Audio => TrackFeed::Audio(broadcast::channel(64).0),
    };
    let shared = Arc::new(TrackShared {
        id: Uuid::new_v4().to_string(),
        kind,
        feed,
        ended_tx: watch::channel(false).0,
        stopped: AtomicBool::new(false),
    });
    (
        MediaTrack {
            shared: shared.clone(),
        },
        TrackSource { shared },
    )
}

/// Create a video track pair
pub fn video_track() -> (MediaTrack, TrackSource) {
    new_track(TrackKind::Video)
}

/// Create an audio track pair
pub fn audio_track() -> (MediaTrack, TrackSource) {
    new_track(TrackKind::Audio)
}

impl MediaTrack {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn kind(&self) -> TrackKind {
        self.shared.kind
    }

    /// Current-frame handle for video tracks
    pub fn frames(&self) -> Option<FrameHandle> {
        match &self.shared.feed {
            TrackFeed::Video(tx) => Some(tx.subscribe()),
            TrackFeed::Audio(_) => None,
        }
    }

    /// Chunk subscription for audio tracks
    pub fn audio(&self) -> Option<AudioHandle> {
        match &self.shared.feed {
            TrackFeed::Audio(tx) => Some(tx.subscribe()),
            TrackFeed::Video(_) => None,
        }
    }

    /// Subscribe to the ended notification.
    ///
    /// Fires both on platform-driven termination (e.g. the user stopped
    /// sharing) and on an explicit `stop`.
    pub fn ended(&self) -> watch::Receiver<bool> {
        self.shared.ended_tx.subscribe()
    }

    pub fn is_ended(&self) -> bool {
        *self.shared.ended_tx.borrow()
    }

    /// Release the track. Idempotent; the producer loop observes this and
    /// shuts down.
    pub fn stop(&self) {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            self.shared.ended_tx.send_replace(true);
            tracing::debug!("Track {} ({:?}) stopped", self.shared.id, self.shared.kind);
        }
    }
}

impl TrackSource {
    /// Publish a frame. Returns false once the track is stopped.
    pub fn push_frame(&self, frame: VideoFrame) -> bool {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return false;
        }
        match &self.shared.feed {
            TrackFeed::Video(tx) => {
                tx.send_replace(Some(Arc::new(frame)));
                true
            }
            TrackFeed::Audio(_) => false,
        }
    }

    /// Publish an audio chunk. Returns false once the track is stopped.
    pub fn push_chunk(&self, chunk: AudioChunk) -> bool {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return false;
        }
        match &self.shared.feed {
            TrackFeed::Audio(tx) => {
                // Send fails only when there are no subscribers yet; the
                // chunk is simply dropped in that case.
                let _ = tx.send(Arc::new(chunk));
                true
            }
            TrackFeed::Video(_) => false,
        }
    }

    /// Signal platform-driven termination (the capture went away underneath
    /// us). Consumers see the same ended notification as for `stop`.
    pub fn end(&self) {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            self.shared.ended_tx.send_replace(true);
            tracing::info!(
                "Track {} ({:?}) ended by platform",
                self.shared.id,
                self.shared.kind
            );
        }
    }

    /// Whether the consumer released the track
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }
}

/// An owned platform stream: zero or more tracks from one acquisition
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// First video track, if any
    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Video)
    }

    /// First audio track, if any
    pub fn audio_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Audio)
    }

    /// Stop every track. Idempotent.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// True while at least one track has not ended
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| !t.is_ended())
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop_all();
    }
}

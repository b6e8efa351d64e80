//! Integration tests for capture sources and the device registry

mod mocks;

use framecast::capture::devices::DeviceRegistry;
use framecast::capture::platform::CapturePlatform;
use framecast::capture::source::CaptureSource;
use framecast::error::SourceKind;
use mocks::MockPlatform;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn reconnect_never_leaves_a_duplicate_stream_open() {
    let platform = MockPlatform::new();
    let mut source = CaptureSource::new(SourceKind::Camera);

    source
        .connect(platform.as_ref(), Some("mock-cam"))
        .await
        .expect("first connect");
    source
        .connect(platform.as_ref(), Some("mock-cam"))
        .await
        .expect("reconnect");

    assert_eq!(platform.acquisition_count(SourceKind::Camera), 2);
    assert_eq!(platform.open_stream_count(), 1, "old stream released first");

    source.disconnect();
    assert_eq!(platform.open_stream_count(), 0);
    source.disconnect();
    assert_eq!(platform.open_stream_count(), 0, "disconnect is idempotent");
}

#[tokio::test]
async fn drop_releases_the_stream() {
    let platform = MockPlatform::new();
    {
        let mut source = CaptureSource::new(SourceKind::Microphone);
        source
            .connect(platform.as_ref(), None)
            .await
            .expect("connect");
        assert_eq!(platform.open_stream_count(), 1);
    }
    assert_eq!(platform.open_stream_count(), 0);
}

#[tokio::test]
async fn screen_audio_rejection_retries_video_only() {
    let platform = MockPlatform::new();
    platform.deny_screen_audio.store(true, Ordering::SeqCst);

    let mut source = CaptureSource::new(SourceKind::Screen);
    source
        .connect(platform.as_ref(), None)
        .await
        .expect("video-only retry succeeds");

    let stream = source.stream().expect("stream attached");
    assert!(stream.video_track().is_some());
    assert!(stream.audio_track().is_none(), "no system audio track");
}

#[tokio::test]
async fn screen_denial_propagates() {
    let platform = MockPlatform::new();
    platform.deny_screen.store(true, Ordering::SeqCst);

    let mut source = CaptureSource::new(SourceKind::Screen);
    assert!(source.connect(platform.as_ref(), None).await.is_err());
    assert!(!source.is_connected());
    assert_eq!(platform.open_stream_count(), 0);
}

#[tokio::test]
async fn registry_recovers_after_enumeration_outage() {
    let platform = MockPlatform::new();
    let registry = DeviceRegistry::new(Arc::clone(&platform) as Arc<dyn CapturePlatform>);

    platform.fail_enumeration.store(true, Ordering::SeqCst);
    assert!(registry.list_devices().await.is_empty());
    assert!(registry.last_error().is_some());

    platform.fail_enumeration.store(false, Ordering::SeqCst);
    let devices = registry.list_devices().await;
    assert_eq!(devices.len(), 2);
    assert!(registry.last_error().is_none());
    assert_eq!(registry.camera_selection().as_deref(), Some("mock-cam"));
    assert_eq!(registry.microphone_selection().as_deref(), Some("mock-mic"));
}

//! Recording session state machine
//!
//! Orchestrates capture sources, the audio mixer, the frame compositor,
//! and the encoder session. Owns every lifecycle transition
//! (idle → connecting → recording ⇄ paused → stopped → idle) and
//! guarantees that no platform stream stays open once a session ends,
//! whatever path led there.

use crate::artifact::Artifact;
use crate::capture::devices::DeviceRegistry;
use crate::capture::platform::CapturePlatform;
use crate::capture::source::CaptureSource;
use crate::compositor::{CompositorConfig, CompositorHandle, FrameCompositor};
use crate::encoder::backend::{EncoderBackend, EncoderInputs};
use crate::encoder::config::{default_cascade, EncoderConfig};
use crate::encoder::session::EncoderSession;
use crate::error::{ErrorResponse, RecordingError, RecordingResult, SourceKind};
use crate::mixer::{AudioMixer, MixedTrack, MixerConfig};
use crate::recorder::clock::DurationClock;
use crate::recorder::state::{RecordingEvent, RecordingStatus, SessionConfig, SessionSnapshot};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// The single-writer recording session
pub struct RecordingSession {
    platform: Arc<dyn CapturePlatform>,
    backend: Arc<dyn EncoderBackend>,
    registry: Arc<DeviceRegistry>,

    config: SessionConfig,
    compositor_config: CompositorConfig,
    mixer_config: MixerConfig,
    cascade: Vec<EncoderConfig>,

    status_tx: watch::Sender<RecordingStatus>,

    screen: CaptureSource,
    camera: CaptureSource,
    microphone: CaptureSource,

    clock: DurationClock,
    compositor: Option<CompositorHandle>,
    encoder: Option<EncoderSession>,
    mixed: Option<MixedTrack>,

    selected_config: Option<EncoderConfig>,
    artifact: Option<Arc<Artifact>>,
    error: Option<ErrorResponse>,
    warnings: Vec<String>,

    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingSession {
    pub fn new(platform: Arc<dyn CapturePlatform>, backend: Arc<dyn EncoderBackend>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let registry = Arc::new(DeviceRegistry::new(Arc::clone(&platform)));
        Self {
            platform,
            backend,
            registry,
            config: SessionConfig::default(),
            compositor_config: CompositorConfig::default(),
            mixer_config: MixerConfig::default(),
            cascade: default_cascade(),
            status_tx: watch::channel(RecordingStatus::Idle).0,
            screen: CaptureSource::new(SourceKind::Screen),
            camera: CaptureSource::new(SourceKind::Camera),
            microphone: CaptureSource::new(SourceKind::Microphone),
            clock: DurationClock::new(),
            compositor: None,
            encoder: None,
            mixed: None,
            selected_config: None,
            artifact: None,
            error: None,
            warnings: Vec::new(),
            event_tx,
        }
    }

    pub fn status(&self) -> RecordingStatus {
        *self.status_tx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<RecordingStatus> {
        self.status_tx.subscribe()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<RecordingEvent> {
        self.event_tx.clone()
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn duration_ms(&self) -> f64 {
        self.clock.elapsed_ms()
    }

    pub fn artifact(&self) -> Option<Arc<Artifact>> {
        self.artifact.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status(),
            duration_ms: self.clock.elapsed_ms(),
            artifact: self.artifact.as_ref().map(|a| a.info()),
            selected_config: self.selected_config.clone(),
            error: self.error.clone(),
            warnings: self.warnings.clone(),
        }
    }

    fn set_status(&self, status: RecordingStatus) {
        self.status_tx.send_replace(status);
    }

    fn config_mutable(&self) -> bool {
        matches!(
            self.status(),
            RecordingStatus::Idle | RecordingStatus::Connecting
        )
    }

    /// Replace the session configuration. Frozen while a session runs.
    pub fn set_config(&mut self, config: SessionConfig) {
        if !self.config_mutable() {
            tracing::warn!("Ignoring config change while {:?}", self.status());
            return;
        }
        self.config = config;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the compositor configuration. Frozen while a session runs.
    pub fn set_compositor_config(&mut self, config: CompositorConfig) {
        if !self.config_mutable() {
            tracing::warn!("Ignoring compositor config change while {:?}", self.status());
            return;
        }
        self.compositor_config = config;
    }

    pub fn compositor_config(&self) -> &CompositorConfig {
        &self.compositor_config
    }

    /// Override the encoder fallback cascade. Frozen while a session runs.
    pub fn set_cascade(&mut self, cascade: Vec<EncoderConfig>) {
        if !self.config_mutable() {
            tracing::warn!("Ignoring cascade change while {:?}", self.status());
            return;
        }
        self.cascade = cascade;
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message.clone());
        let _ = self.event_tx.send(RecordingEvent::Warning(message));
    }

    fn fail(&mut self, error: &RecordingError) {
        tracing::error!("{}", error);
        self.error = Some(ErrorResponse::from(error));
        let _ = self.event_tx.send(RecordingEvent::Error(error.to_string()));
    }

    fn camera_device(&self) -> Option<String> {
        self.config
            .camera_device_id
            .clone()
            .or_else(|| self.registry.camera_selection())
    }

    fn microphone_device(&self) -> Option<String> {
        self.config
            .microphone_device_id
            .clone()
            .or_else(|| self.registry.microphone_selection())
    }

    /// Connect the screen source for preview or recording.
    /// Moves an idle session to connecting.
    pub async fn connect_screen(&mut self) -> RecordingResult<()> {
        if !self.config_mutable() {
            return Ok(());
        }
        self.screen.connect(self.platform.as_ref(), None).await?;
        self.set_status(RecordingStatus::Connecting);
        Ok(())
    }

    /// Connect the camera source for preview or recording
    pub async fn connect_camera(&mut self) -> RecordingResult<()> {
        if !self.config_mutable() {
            return Ok(());
        }
        let device = self.camera_device();
        self.camera
            .connect(self.platform.as_ref(), device.as_deref())
            .await?;
        self.registry.refresh().await;
        self.set_status(RecordingStatus::Connecting);
        Ok(())
    }

    /// Connect the microphone source for preview or recording
    pub async fn connect_microphone(&mut self) -> RecordingResult<()> {
        if !self.config_mutable() {
            return Ok(());
        }
        let device = self.microphone_device();
        self.microphone
            .connect(self.platform.as_ref(), device.as_deref())
            .await?;
        self.registry.refresh().await;
        self.set_status(RecordingStatus::Connecting);
        Ok(())
    }

    /// Disconnect one source. When the last previewed source goes away
    /// the session returns to idle.
    pub fn disconnect_source(&mut self, kind: SourceKind) {
        match kind {
            SourceKind::Screen => self.screen.disconnect(),
            SourceKind::Camera => self.camera.disconnect(),
            SourceKind::Microphone => self.microphone.disconnect(),
        }
        if self.status() == RecordingStatus::Connecting
            && !self.screen.is_connected()
            && !self.camera.is_connected()
            && !self.microphone.is_connected()
        {
            self.set_status(RecordingStatus::Idle);
        }
    }

    /// Start recording: acquire missing sources, wire the mixer, prime
    /// the compositor, start the encoder, begin duration accounting.
    pub async fn start(&mut self) -> RecordingResult<()> {
        if !self.config_mutable() {
            tracing::warn!("start() ignored while {:?}", self.status());
            return Ok(());
        }

        tracing::info!("Starting recording session");
        self.set_status(RecordingStatus::Connecting);
        self.warnings.clear();
        self.error = None;

        // Screen is mandatory
        if !self.screen.is_connected() {
            if let Err(e) = self.screen.connect(self.platform.as_ref(), None).await {
                self.fail(&e);
                self.release_all();
                self.set_status(RecordingStatus::Idle);
                return Err(e);
            }
        }

        // Camera is cosmetic: a busy device degrades to no overlay
        if self.config.record_camera && !self.camera.is_connected() {
            let device = self.camera_device();
            if let Err(e) = self
                .camera
                .connect(self.platform.as_ref(), device.as_deref())
                .await
            {
                self.warn(format!(
                    "Could not access camera, continuing without overlay: {e}"
                ));
            }
        }

        // Microphone is load-bearing when audio recording was enabled
        if self.config.record_microphone && !self.microphone.is_connected() {
            let device = self.microphone_device();
            if let Err(e) = self
                .microphone
                .connect(self.platform.as_ref(), device.as_deref())
                .await
            {
                self.fail(&e);
                self.release_all();
                self.set_status(RecordingStatus::Idle);
                return Err(e);
            }
        }

        // Labels populate once permission has been granted
        self.registry.refresh().await;

        let Some(screen_frames) = self.screen.frame_handle() else {
            let e = RecordingError::denied(SourceKind::Screen, "stream has no video track");
            self.fail(&e);
            self.release_all();
            self.set_status(RecordingStatus::Idle);
            return Err(e);
        };

        // Wire the audio mixer: screen system audio plus microphone
        let mic_audio = if self.config.record_microphone && self.microphone.enabled() {
            self.microphone.audio_handle()
        } else {
            None
        };
        self.mixed = AudioMixer::build(
            self.screen.audio_handle(),
            mic_audio,
            self.mixer_config.clone(),
        );

        // Compositor, with the config frozen for this session
        let camera_frames = if self.config.record_camera && self.camera.enabled() {
            self.camera.frame_handle()
        } else {
            None
        };
        let compositor_config = self.compositor_config.clone();
        let compositor =
            FrameCompositor::new(compositor_config.clone(), screen_frames, camera_frames);

        let inputs = EncoderInputs {
            video: compositor.frames(),
            width: compositor_config.output_width,
            height: compositor_config.output_height,
            frame_rate: compositor_config.frame_rate,
            audio: self.mixed.as_ref().map(|m| m.subscribe()),
            sample_rate: self.mixer_config.output_sample_rate,
            channels: self.mixer_config.output_channels,
        };

        // Priming draw after the encoder feed is subscribed, so the
        // first encoded frame is never blank
        compositor.prime();

        let encoder =
            match EncoderSession::start(self.backend.as_ref(), &self.cascade, inputs).await {
                Ok(encoder) => encoder,
                Err(e) => {
                    self.fail(&e);
                    self.release_all();
                    self.set_status(RecordingStatus::Idle);
                    return Err(e);
                }
            };
        self.selected_config = Some(encoder.selected_config().clone());
        self.encoder = Some(encoder);

        self.clock.start();
        self.set_status(RecordingStatus::Recording);
        self.compositor = Some(compositor.start(self.status_watch()));

        let _ = self.event_tx.send(RecordingEvent::Started);
        tracing::info!(
            "Recording started ({})",
            self.selected_config
                .as_ref()
                .map(|c| c.media_type())
                .unwrap_or_default()
        );
        Ok(())
    }

    /// Pause recording. No-op outside of recording.
    pub async fn pause(&mut self) -> RecordingResult<()> {
        if self.status() != RecordingStatus::Recording {
            return Ok(());
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.pause().await?;
        }
        self.clock.pause();
        self.set_status(RecordingStatus::Paused);
        let _ = self.event_tx.send(RecordingEvent::Paused);
        tracing::info!("Recording paused at {:.0}ms", self.clock.elapsed_ms());
        Ok(())
    }

    /// Resume recording. No-op outside of paused.
    pub async fn resume(&mut self) -> RecordingResult<()> {
        if self.status() != RecordingStatus::Paused {
            return Ok(());
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.resume().await?;
        }
        self.clock.resume();
        self.set_status(RecordingStatus::Recording);
        let _ = self.event_tx.send(RecordingEvent::Resumed);
        tracing::info!("Recording resumed");
        Ok(())
    }

    /// Stop recording: flush and finalize the encoder, then release every
    /// capture source unconditionally. A second stop is a no-op.
    pub async fn stop(&mut self) -> RecordingResult<()> {
        if !matches!(
            self.status(),
            RecordingStatus::Recording | RecordingStatus::Paused
        ) {
            return Ok(());
        }

        tracing::info!("Stopping recording");
        self.clock.stop();
        let duration_ms = self.clock.elapsed_ms();

        // Flush and finalize first; release must follow even when
        // finalize reports failure.
        let finalized = match self.encoder.take() {
            Some(encoder) => encoder.stop(duration_ms).await,
            None => Err(RecordingError::EmptyRecording),
        };

        self.release_all();
        self.set_status(RecordingStatus::Stopped);

        match finalized {
            Ok(artifact) => {
                tracing::info!(
                    "Recording stopped: {} ({} bytes, {:.0}ms)",
                    artifact.filename,
                    artifact.byte_size(),
                    duration_ms
                );
                self.artifact = Some(Arc::new(artifact));
                let _ = self.event_tx.send(RecordingEvent::Stopped);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                let _ = self.event_tx.send(RecordingEvent::Stopped);
                Err(e)
            }
        }
    }

    /// Dismiss a completed artifact and return to idle
    pub fn dismiss(&mut self) {
        if self.status() != RecordingStatus::Stopped {
            return;
        }
        self.artifact = None;
        self.selected_config = None;
        self.error = None;
        self.warnings.clear();
        self.clock.reset();
        self.set_status(RecordingStatus::Idle);
        tracing::debug!("Session dismissed");
    }

    /// Release everything without finalizing (component teardown,
    /// navigation away). Idempotent under repeated calls.
    pub fn teardown(&mut self) {
        self.release_all();
        if matches!(
            self.status(),
            RecordingStatus::Connecting | RecordingStatus::Recording | RecordingStatus::Paused
        ) {
            self.clock.reset();
            self.encoder = None;
            self.set_status(RecordingStatus::Idle);
        }
    }

    /// Ended notification of the screen's video track, used for
    /// auto-stop on platform-driven termination
    pub fn screen_ended_watch(&self) -> Option<watch::Receiver<bool>> {
        self.screen.video_ended()
    }

    /// True when no source currently owns a platform stream
    pub fn all_sources_released(&self) -> bool {
        !self.screen.is_connected()
            && !self.camera.is_connected()
            && !self.microphone.is_connected()
    }

    fn release_all(&mut self) {
        if let Some(compositor) = self.compositor.take() {
            compositor.cancel();
        }
        if let Some(mixed) = self.mixed.take() {
            mixed.stop();
        }
        self.screen.disconnect();
        self.camera.disconnect();
        self.microphone.disconnect();
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.release_all();
    }
}

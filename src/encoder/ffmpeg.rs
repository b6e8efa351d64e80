//! FFmpeg CLI encoder backend
//!
//! Encodes the composited stream by piping raw BGRA frames into an
//! `ffmpeg` child process and reading fragmented container bytes back
//! from its stdout, so partial data survives a crash or forced stop.
//! Mixed audio is staged to a WAV file and muxed in at finalize, the
//! same separate-channel-then-mux shape the export pipeline uses.

use crate::encoder::backend::{
    EncodedOutput, EncoderBackend, EncoderHandle, EncoderInputs, Fragment,
};
use crate::encoder::config::{ContainerFormat, EncoderConfig};
use crate::error::{RecordingError, RecordingResult};
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch, OnceCell};
use tokio::task::JoinHandle;

/// Encoder backend shelling out to the `ffmpeg` binary
pub struct FfmpegEncoderBackend {
    ffmpeg_path: String,
    encoders: OnceCell<Option<String>>,
}

impl FfmpegEncoderBackend {
    pub fn new() -> Self {
        Self::with_path("ffmpeg")
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: path.into(),
            encoders: OnceCell::new(),
        }
    }

    /// Output of `ffmpeg -encoders`, probed once. `None` when the binary
    /// is missing or unusable, which makes every configuration
    /// unsupported and lets the cascade exhaust cleanly.
    async fn encoder_list(&self) -> Option<&str> {
        self.encoders
            .get_or_init(|| async {
                match probe_encoders(&self.ffmpeg_path).await {
                    Ok(list) => Some(list),
                    Err(e) => {
                        tracing::warn!("ffmpeg probe failed: {:#}", e);
                        None
                    }
                }
            })
            .await
            .as_deref()
    }
}

impl Default for FfmpegEncoderBackend {
    fn default() -> Self {
        Self::new()
    }
}

async fn probe_encoders(ffmpeg_path: &str) -> anyhow::Result<String> {
    let output = tokio::process::Command::new(ffmpeg_path)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run {ffmpeg_path}"))?;
    if !output.status.success() {
        anyhow::bail!("{} -encoders exited with {}", ffmpeg_path, output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl EncoderBackend for FfmpegEncoderBackend {
    async fn is_configuration_supported(&self, config: &EncoderConfig) -> bool {
        let Some(list) = self.encoder_list().await else {
            return false;
        };
        if !list.contains(config.video_codec.ffmpeg_name()) {
            return false;
        }
        match config.audio_codec {
            Some(audio) => list.contains(audio.ffmpeg_name()),
            None => true,
        }
    }

    async fn create(
        &self,
        inputs: EncoderInputs,
        config: &EncoderConfig,
    ) -> RecordingResult<Box<dyn EncoderHandle>> {
        let staging = tempfile::tempdir()?;
        let with_audio = config.has_audio() && inputs.audio.is_some();

        let mut cmd = tokio::process::Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pixel_format", "bgra"])
            .args(["-video_size", &format!("{}x{}", inputs.width, inputs.height)])
            .args(["-framerate", &inputs.frame_rate.to_string()])
            .args(["-i", "-"])
            .args(["-c:v", config.video_codec.ffmpeg_name()])
            .args(["-b:v", &config.video_bitrate.to_string()])
            .args(["-pix_fmt", "yuv420p"]);
        match config.video_codec {
            crate::encoder::config::VideoCodec::H264 => {
                cmd.args(["-preset", "veryfast"]);
            }
            _ => {
                cmd.args(["-deadline", "realtime"]);
            }
        }
        match config.container {
            ContainerFormat::Mp4 => {
                cmd.args(["-movflags", "+frag_keyframe+empty_moov", "-f", "mp4"]);
            }
            ContainerFormat::Webm => {
                cmd.args(["-f", "webm"]);
            }
        }
        cmd.arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| RecordingError::EncoderRuntime(format!("failed to spawn ffmpeg: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecordingError::EncoderRuntime("ffmpeg stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecordingError::EncoderRuntime("ffmpeg stdout unavailable".into()))?;

        let paused = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (fragments_tx, fragments_rx) = mpsc::channel(64);

        let feeder = tokio::spawn(feed_video(
            stdin,
            inputs.video,
            (inputs.width * inputs.height * 4) as usize,
            Arc::clone(&paused),
            stop_rx.clone(),
        ));

        // When audio is present the fragment stream is also teed to a
        // staging file so finalize can mux it with the WAV.
        let video_tee = with_audio.then(|| staging.path().join("video-stream"));
        let reader = tokio::spawn(read_fragments(stdout, fragments_tx, video_tee.clone()));

        let (audio_task, audio_path) = if with_audio {
            let path = staging.path().join("audio.wav");
            let spec = hound::WavSpec {
                channels: inputs.channels,
                sample_rate: inputs.sample_rate,
                bits_per_sample: 32,
                sample_format: hound::SampleFormat::Float,
            };
            let writer = hound::WavWriter::create(&path, spec).map_err(|e| {
                RecordingError::EncoderRuntime(format!("failed to create audio staging: {e}"))
            })?;
            let rx = inputs.audio.expect("with_audio implies audio input");
            let task = tokio::spawn(stage_audio(writer, rx, Arc::clone(&paused), stop_rx));
            (Some(task), Some(path))
        } else {
            (None, None)
        };

        Ok(Box::new(FfmpegEncoderHandle {
            ffmpeg_path: self.ffmpeg_path.clone(),
            child,
            config: config.clone(),
            paused,
            stop_tx,
            fragments_rx: Some(fragments_rx),
            feeder: Some(feeder),
            reader: Some(reader),
            audio_task,
            video_tee,
            audio_path,
            _staging: staging,
        }))
    }
}

async fn feed_video(
    mut stdin: tokio::process::ChildStdin,
    mut video: tokio::sync::broadcast::Receiver<Arc<crate::capture::stream::VideoFrame>>,
    expected_len: usize,
    paused: Arc<AtomicBool>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            result = video.recv() => match result {
                Ok(frame) => {
                    if paused.load(Ordering::Relaxed) {
                        continue;
                    }
                    if frame.data.len() != expected_len {
                        tracing::warn!(
                            "Dropping frame with unexpected size: {} != {}",
                            frame.data.len(),
                            expected_len
                        );
                        continue;
                    }
                    if stdin.write_all(&frame.data).await.is_err() {
                        tracing::warn!("ffmpeg stdin closed, stopping video feed");
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Video feed lagged, {} frames dropped", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    // Dropping stdin closes the pipe; ffmpeg flushes and exits.
    drop(stdin);
}

async fn read_fragments(
    mut stdout: tokio::process::ChildStdout,
    fragments: mpsc::Sender<Fragment>,
    tee_path: Option<PathBuf>,
) {
    let mut tee = match tee_path {
        Some(path) => match tokio::fs::File::create(&path).await {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("Failed to create video tee file: {}", e);
                None
            }
        },
        None => None,
    };

    let started = Instant::now();
    let mut buf = vec![0u8; 64 * 1024];
    let mut sequence = 0u64;
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Some(file) = tee.as_mut() {
                    let _ = file.write_all(&buf[..n]).await;
                }
                let fragment = Fragment {
                    sequence,
                    data: buf[..n].to_vec(),
                    timestamp_ms: started.elapsed().as_secs_f64() * 1000.0,
                };
                sequence += 1;
                if fragments.send(fragment).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("ffmpeg stdout read error: {}", e);
                break;
            }
        }
    }
    if let Some(mut file) = tee {
        let _ = file.flush().await;
    }
}

async fn stage_audio(
    mut writer: hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    mut audio: tokio::sync::broadcast::Receiver<Arc<crate::capture::stream::AudioChunk>>,
    paused: Arc<AtomicBool>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            result = audio.recv() => match result {
                Ok(chunk) => {
                    if paused.load(Ordering::Relaxed) {
                        continue;
                    }
                    for sample in &chunk.samples {
                        let _ = writer.write_sample(*sample);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Audio staging lagged, {} chunks dropped", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    if let Err(e) = writer.finalize() {
        tracing::warn!("Failed to finalize audio staging: {}", e);
    }
}

struct FfmpegEncoderHandle {
    ffmpeg_path: String,
    child: tokio::process::Child,
    config: EncoderConfig,
    paused: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    fragments_rx: Option<mpsc::Receiver<Fragment>>,
    feeder: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    audio_task: Option<JoinHandle<()>>,
    video_tee: Option<PathBuf>,
    audio_path: Option<PathBuf>,
    _staging: tempfile::TempDir,
}

impl FfmpegEncoderHandle {
    fn video_only_media_type(&self) -> String {
        EncoderConfig {
            audio_codec: None,
            ..self.config.clone()
        }
        .media_type()
    }

    /// Mux the teed video stream with the staged WAV into one container.
    async fn mux(&self, video: &PathBuf, audio: &PathBuf) -> anyhow::Result<Vec<u8>> {
        let out = video.with_file_name(format!("muxed.{}", self.config.extension()));
        let audio_codec = self
            .config
            .audio_codec
            .expect("mux requires an audio codec");

        let mut cmd = tokio::process::Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-c:v", "copy"])
            .args(["-c:a", audio_codec.ffmpeg_name()])
            .args(["-b:a", &self.config.audio_bitrate.to_string()]);
        if self.config.container == ContainerFormat::Mp4 {
            cmd.args(["-movflags", "+faststart"]);
        }
        cmd.arg(&out).stdin(Stdio::null());

        let status = cmd.status().await.context("failed to run ffmpeg mux")?;
        if !status.success() {
            anyhow::bail!("ffmpeg mux exited with {status}");
        }
        tokio::fs::read(&out).await.context("failed to read muxed output")
    }
}

#[async_trait]
impl EncoderHandle for FfmpegEncoderHandle {
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
        let _ = self.stop_tx.send(true);

        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.await;
        }
        if let Some(audio_task) = self.audio_task.take() {
            let _ = audio_task.await;
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| RecordingError::FinalizeFailed(format!("ffmpeg wait failed: {e}")))?;

        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }

        if !status.success() {
            return Err(RecordingError::FinalizeFailed(format!(
                "ffmpeg exited with {status}"
            )));
        }

        match (self.video_tee.as_ref(), self.audio_path.as_ref()) {
            (Some(video), Some(audio)) => {
                // A WAV with no frames means no audio ever arrived; the
                // fragments already are the whole recording.
                let staged = tokio::fs::metadata(audio)
                    .await
                    .map(|m| m.len() > 44)
                    .unwrap_or(false);
                if !staged {
                    return Ok(EncodedOutput {
                        media_type: self.video_only_media_type(),
                        finalized: None,
                    });
                }
                match self.mux(video, audio).await {
                    Ok(body) => Ok(EncodedOutput {
                        media_type: self.config.media_type(),
                        finalized: Some(body),
                    }),
                    Err(e) => {
                        tracing::warn!("Audio mux failed, keeping video-only output: {:#}", e);
                        Ok(EncodedOutput {
                            media_type: self.video_only_media_type(),
                            finalized: None,
                        })
                    }
                }
            }
            _ => Ok(EncodedOutput {
                media_type: if self.config.has_audio() {
                    // Audio was negotiated but never wired; declare what
                    // was actually produced.
                    self.video_only_media_type()
                } else {
                    self.config.media_type()
                },
                finalized: None,
            }),
        }
    }
}

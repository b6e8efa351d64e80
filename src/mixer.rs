//! Audio mixing for the recording session
//!
//! Combines the screen source's system audio (if granted) and the
//! microphone (if enabled) into a single mixed chunk stream for the
//! encoder. With one input the mixer forwards it; with none there is no
//! output track and the encoder proceeds video-only.

use crate::capture::stream::{AudioChunk, AudioHandle};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Gain control for one mixer input
#[derive(Debug, Clone, Copy)]
pub struct ChannelGain {
    /// Gain level (0.0 = muted, 1.0 = unchanged)
    pub gain: f32,
    /// Muted flag
    pub muted: bool,
}

impl Default for ChannelGain {
    fn default() -> Self {
        Self {
            gain: 1.0,
            muted: false,
        }
    }
}

impl ChannelGain {
    pub fn effective(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.gain
        }
    }
}

/// Mixer configuration
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Screen/system audio gain
    pub screen_gain: ChannelGain,
    /// Microphone gain
    pub mic_gain: ChannelGain,
    /// Output sample rate
    pub output_sample_rate: u32,
    /// Output channels
    pub output_channels: u16,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            screen_gain: ChannelGain::default(),
            mic_gain: ChannelGain::default(),
            output_sample_rate: 48000,
            output_channels: 2,
        }
    }
}

/// The mixer's single output track
pub struct MixedTrack {
    output: broadcast::Sender<Arc<AudioChunk>>,
    running: Arc<AtomicBool>,
    inputs: usize,
    task: JoinHandle<()>,
}

impl MixedTrack {
    /// Subscribe to mixed chunks
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AudioChunk>> {
        self.output.subscribe()
    }

    /// Number of connected inputs (1 or 2)
    pub fn input_count(&self) -> usize {
        self.inputs
    }

    /// Stop the mixing task. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Stopping audio mixer");
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for MixedTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builds the mixing destination for a session
pub struct AudioMixer;

impl AudioMixer {
    /// Wire zero, one, or two inputs into one output track.
    ///
    /// Returns `None` when neither input is present.
    pub fn build(
        screen: Option<AudioHandle>,
        mic: Option<AudioHandle>,
        config: MixerConfig,
    ) -> Option<MixedTrack> {
        let inputs = usize::from(screen.is_some()) + usize::from(mic.is_some());
        if inputs == 0 {
            tracing::debug!("No audio inputs, mixer output absent");
            return None;
        }

        let (output, _) = broadcast::channel(64);
        let running = Arc::new(AtomicBool::new(true));

        tracing::info!(
            "Audio mixer wired: screen={}, mic={}",
            screen.is_some(),
            mic.is_some()
        );

        let task = {
            let output = output.clone();
            let running = Arc::clone(&running);
            match (screen, mic) {
                (Some(rx), None) => {
                    let gain = config.screen_gain;
                    tokio::spawn(forward_single(rx, gain, output, running))
                }
                (None, Some(rx)) => {
                    let gain = config.mic_gain;
                    tokio::spawn(forward_single(rx, gain, output, running))
                }
                (Some(screen_rx), Some(mic_rx)) => {
                    tokio::spawn(mix_pair(screen_rx, mic_rx, config, output, running))
                }
                (None, None) => unreachable!(),
            }
        };

        Some(MixedTrack {
            output,
            running,
            inputs,
            task,
        })
    }
}

async fn forward_single(
    mut rx: AudioHandle,
    gain: ChannelGain,
    output: broadcast::Sender<Arc<AudioChunk>>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match rx.recv().await {
            Ok(chunk) => {
                let _ = output.send(Arc::new(apply_gain(&chunk, gain.effective())));
            }
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Mixer dropped {} audio chunks due to lag", n);
            }
        }
    }
}

async fn mix_pair(
    mut screen_rx: AudioHandle,
    mut mic_rx: AudioHandle,
    config: MixerConfig,
    output: broadcast::Sender<Arc<AudioChunk>>,
    running: Arc<AtomicBool>,
) {
    let mut screen_buf: VecDeque<Arc<AudioChunk>> = VecDeque::with_capacity(8);
    let mut mic_buf: VecDeque<Arc<AudioChunk>> = VecDeque::with_capacity(8);
    let mut screen_done = false;
    let mut mic_done = false;

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            biased;

            result = screen_rx.recv(), if !screen_done => match result {
                Ok(chunk) => screen_buf.push_back(chunk),
                Err(broadcast::error::RecvError::Closed) => screen_done = true,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Mixer dropped {} screen-audio chunks", n);
                }
            },

            result = mic_rx.recv(), if !mic_done => match result {
                Ok(chunk) => mic_buf.push_back(chunk),
                Err(broadcast::error::RecvError::Closed) => mic_done = true,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Mixer dropped {} mic chunks", n);
                }
            },

            _ = tokio::time::sleep(std::time::Duration::from_millis(5)) => {}
        }

        while let (Some(screen), Some(mic)) = (screen_buf.front(), mic_buf.front()) {
            let mixed = mix_chunks(screen, mic, &config);
            let _ = output.send(Arc::new(mixed));
            screen_buf.pop_front();
            mic_buf.pop_front();
        }

        // One side gone: drain the other so audio keeps flowing
        if screen_done {
            while let Some(mic) = mic_buf.pop_front() {
                let _ = output.send(Arc::new(apply_gain(&mic, config.mic_gain.effective())));
            }
        }
        if mic_done {
            while let Some(screen) = screen_buf.pop_front() {
                let _ = output.send(Arc::new(apply_gain(&screen, config.screen_gain.effective())));
            }
        }

        if screen_done && mic_done {
            break;
        }
    }
}

fn mix_chunks(screen: &AudioChunk, mic: &AudioChunk, config: &MixerConfig) -> AudioChunk {
    let screen_gain = config.screen_gain.effective();
    let mic_gain = config.mic_gain.effective();

    let max_len = screen.samples.len().max(mic.samples.len());
    let mut mixed = Vec::with_capacity(max_len);
    for i in 0..max_len {
        let s = screen.samples.get(i).copied().unwrap_or(0.0) * screen_gain;
        let m = mic.samples.get(i).copied().unwrap_or(0.0) * mic_gain;
        mixed.push(soft_clip(s + m));
    }

    AudioChunk {
        samples: mixed,
        sample_rate: config.output_sample_rate,
        channels: config.output_channels,
        timestamp_ms: screen.timestamp_ms.min(mic.timestamp_ms),
    }
}

fn apply_gain(chunk: &AudioChunk, gain: f32) -> AudioChunk {
    let samples = if (gain - 1.0).abs() < 0.001 {
        chunk.samples.clone()
    } else {
        chunk.samples.iter().map(|s| soft_clip(s * gain)).collect()
    };
    AudioChunk {
        samples,
        sample_rate: chunk.sample_rate,
        channels: chunk.channels,
        timestamp_ms: chunk.timestamp_ms,
    }
}

/// Soft clip keeping low levels linear and squashing peaks with tanh
fn soft_clip(x: f32) -> f32 {
    if x.abs() <= 0.5 {
        x
    } else {
        x.tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::stream;

    fn chunk(samples: Vec<f32>, ts: f64) -> AudioChunk {
        AudioChunk {
            samples,
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn gain_muted_is_silent() {
        let g = ChannelGain {
            gain: 1.0,
            muted: true,
        };
        assert_eq!(g.effective(), 0.0);
    }

    #[test]
    fn soft_clip_bounds() {
        assert_eq!(soft_clip(0.3), 0.3);
        assert_eq!(soft_clip(-0.3), -0.3);
        let clipped = soft_clip(2.0);
        assert!(clipped < 1.0 && clipped > 0.9);
    }

    #[test]
    fn mix_is_additive_with_shorter_chunk_padded() {
        let config = MixerConfig::default();
        let mixed = mix_chunks(
            &chunk(vec![0.1, 0.1, 0.1], 5.0),
            &chunk(vec![0.2], 3.0),
            &config,
        );
        assert_eq!(mixed.samples.len(), 3);
        assert!((mixed.samples[0] - 0.3).abs() < 1e-6);
        assert!((mixed.samples[1] - 0.1).abs() < 1e-6);
        assert_eq!(mixed.timestamp_ms, 3.0);
    }

    #[test]
    fn no_inputs_means_no_output_track() {
        assert!(AudioMixer::build(None, None, MixerConfig::default()).is_none());
    }

    #[tokio::test]
    async fn single_input_is_forwarded() {
        let (track, source) = stream::audio_track();
        let mixed = AudioMixer::build(track.audio(), None, MixerConfig::default())
            .expect("one input yields a track");
        assert_eq!(mixed.input_count(), 1);

        let mut rx = mixed.subscribe();
        source.push_chunk(chunk(vec![0.25, 0.25], 0.0));
        let out = rx.recv().await.expect("forwarded chunk");
        assert_eq!(out.samples, vec![0.25, 0.25]);
        mixed.stop();
        assert!(!mixed.is_running());
    }

    #[tokio::test]
    async fn two_inputs_are_mixed_pairwise() {
        let (screen_track, screen_src) = stream::audio_track();
        let (mic_track, mic_src) = stream::audio_track();
        let mixed = AudioMixer::build(
            screen_track.audio(),
            mic_track.audio(),
            MixerConfig::default(),
        )
        .expect("two inputs yield a track");
        assert_eq!(mixed.input_count(), 2);

        let mut rx = mixed.subscribe();
        screen_src.push_chunk(chunk(vec![0.1, 0.1], 1.0));
        mic_src.push_chunk(chunk(vec![0.2, 0.2], 1.0));
        let out = rx.recv().await.expect("mixed chunk");
        assert!((out.samples[0] - 0.3).abs() < 1e-6);
        mixed.stop();
    }
}

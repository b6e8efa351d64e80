//! Encoder session
//!
//! Drives one negotiated encoder: accumulates output fragments as they
//! are emitted, forwards pause/resume, and assembles the final artifact
//! at stop.

use crate::artifact::Artifact;
use crate::encoder::backend::{EncoderBackend, EncoderHandle, EncoderInputs, Fragment};
use crate::encoder::config::{negotiate, EncoderConfig};
use crate::error::{RecordingError, RecordingResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A running encoder plus its accumulated output
pub struct EncoderSession {
    handle: Box<dyn EncoderHandle>,
    config: EncoderConfig,
    fragments: Arc<Mutex<Vec<Fragment>>>,
    collector: Option<JoinHandle<()>>,
}

impl EncoderSession {
    /// Negotiate a configuration through the fallback cascade and start
    /// encoding the given inputs.
    pub async fn start(
        backend: &dyn EncoderBackend,
        cascade: &[EncoderConfig],
        inputs: EncoderInputs,
    ) -> RecordingResult<Self> {
        let config = negotiate(backend, cascade).await?;
        let mut handle = backend.create(inputs, &config).await?;
        let mut rx = handle.fragments().ok_or_else(|| {
            RecordingError::EncoderRuntime("backend produced no fragment feed".into())
        })?;

        let fragments: Arc<Mutex<Vec<Fragment>>> = Arc::new(Mutex::new(Vec::new()));
        let collector = {
            let fragments = Arc::clone(&fragments);
            tokio::spawn(async move {
                while let Some(fragment) = rx.recv().await {
                    fragments.lock().push(fragment);
                }
            })
        };

        Ok(Self {
            handle,
            config,
            fragments,
            collector: Some(collector),
        })
    }

    /// The configuration the cascade settled on
    pub fn selected_config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Fragments collected so far
    pub fn fragment_count(&self) -> usize {
        self.fragments.lock().len()
    }

    pub async fn pause(&mut self) -> RecordingResult<()> {
        self.handle.pause().await
    }

    pub async fn resume(&mut self) -> RecordingResult<()> {
        self.handle.resume().await
    }

    /// Flush, finalize, and assemble the artifact.
    ///
    /// Zero collected fragments yield `EmptyRecording` rather than a
    /// zero-byte artifact. The artifact's media type is whatever the
    /// backend actually produced.
    pub async fn stop(mut self, duration_ms: f64) -> RecordingResult<Artifact> {
        let finalized = self.handle.finalize().await;

        // The backend closes the fragment feed during finalize; wait for
        // the collector to drain it so no tail fragment is lost.
        if let Some(collector) = self.collector.take() {
            let _ = collector.await;
        }

        let output = finalized?;
        let fragments = std::mem::take(&mut *self.fragments.lock());
        if fragments.is_empty() {
            tracing::warn!("Encoder finalized with zero fragments");
            return Err(RecordingError::EmptyRecording);
        }

        let data = match output.finalized {
            Some(body) => body,
            None => {
                let total: usize = fragments.iter().map(|f| f.data.len()).sum();
                let mut body = Vec::with_capacity(total);
                for fragment in &fragments {
                    body.extend_from_slice(&fragment.data);
                }
                body
            }
        };

        tracing::info!(
            "Assembled artifact: {} fragments, {} bytes, {}",
            fragments.len(),
            data.len(),
            output.media_type
        );
        Ok(Artifact::new(data, output.media_type, duration_ms))
    }
}

//! Recording artifacts
//!
//! The final encoded output of a completed session: a binary body plus
//! the declared media type and a timestamped filename whose extension
//! matches the negotiated container, not an assumed default.

use crate::error::RecordingResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extension for a declared media type
pub fn extension_for_media_type(media_type: &str) -> &'static str {
    if media_type.starts_with("video/mp4") {
        "mp4"
    } else if media_type.starts_with("video/webm") {
        "webm"
    } else {
        "bin"
    }
}

/// The encoded output of a completed recording session
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Encoded bytes
    pub data: Vec<u8>,

    /// Declared media type, including codec tags
    pub media_type: String,

    /// Timestamped download filename
    pub filename: String,

    /// Recorded duration in milliseconds
    pub duration_ms: f64,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Artifact metadata without the body, for snapshots and sidecars
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub filename: String,
    pub media_type: String,
    pub byte_size: usize,
    pub duration_ms: f64,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(data: Vec<u8>, media_type: String, duration_ms: f64) -> Self {
        let created_at = Utc::now();
        let filename = format!(
            "recording-{}.{}",
            created_at.format("%Y-%m-%d-%H%M%S"),
            extension_for_media_type(&media_type)
        );
        Self {
            data,
            media_type,
            filename,
            duration_ms,
            created_at,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            filename: self.filename.clone(),
            media_type: self.media_type.clone(),
            byte_size: self.data.len(),
            duration_ms: self.duration_ms,
            created_at: self.created_at,
        }
    }

    /// Write the body plus a JSON metadata sidecar into `dir`.
    /// Returns the path of the written recording.
    pub fn save_to_dir(&self, dir: &Path) -> RecordingResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.data)?;

        let sidecar = path.with_extension(format!(
            "{}.json",
            extension_for_media_type(&self.media_type)
        ));
        let metadata = serde_json::to_string_pretty(&self.info())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&sidecar, metadata)?;

        tracing::info!("Saved artifact to {:?} ({} bytes)", path, self.data.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_extension_follows_media_type() {
        let artifact = Artifact::new(vec![1, 2, 3], "video/webm;codecs=vp9,opus".into(), 1000.0);
        assert!(artifact.filename.ends_with(".webm"));
        assert!(artifact.filename.starts_with("recording-"));

        let artifact = Artifact::new(vec![1], "video/mp4;codecs=h264,aac".into(), 1.0);
        assert!(artifact.filename.ends_with(".mp4"));
    }

    #[test]
    fn save_writes_body_and_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = Artifact::new(vec![5; 64], "video/webm;codecs=vp8".into(), 250.0);
        let path = artifact.save_to_dir(dir.path()).expect("save");
        assert_eq!(std::fs::read(&path).expect("body").len(), 64);

        let sidecar = path.with_extension("webm.json");
        let metadata: ArtifactInfo =
            serde_json::from_str(&std::fs::read_to_string(sidecar).expect("sidecar"))
                .expect("parse");
        assert_eq!(metadata.byte_size, 64);
        assert_eq!(metadata.duration_ms, 250.0);
    }
}

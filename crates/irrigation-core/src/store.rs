//! Durable storage for the trained artifact
//!
//! One JSON file holds a small envelope around the artifact:
//!
//! ```json
//! {"format_version": 1, "checksum": "<sha256 hex>", "artifact": { ... }}
//! ```
//!
//! The checksum covers the exact artifact text as written. Saves go to a
//! sibling `.tmp` file that is fsynced and then renamed over the target, so
//! readers never observe a half-written artifact.

use crate::error::{EngineError, Result};
use crate::training::TrainedArtifact;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Envelope layout version
pub const FORMAT_VERSION: u32 = 1;

/// Default artifact location, relative to the working directory
pub const DEFAULT_ARTIFACT_PATH: &str = "modelo_irrigacao.json";

#[derive(Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    checksum: String,
    artifact: Box<RawValue>,
}

/// Reads and writes the artifact at a fixed path
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Overwrite the stored artifact
    pub fn save(&self, artifact: &TrainedArtifact) -> Result<()> {
        let raw = serde_json::value::to_raw_value(artifact).map_err(|e| {
            EngineError::Persistence {
                operation: "serialize",
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            }
        })?;
        let envelope = Envelope {
            format_version: FORMAT_VERSION,
            checksum: compute_checksum(raw.get().as_bytes()),
            artifact: raw,
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|e| EngineError::Persistence {
            operation: "serialize",
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        let temp_path = self.temp_path();
        let persist = |operation: &'static str| {
            let path = temp_path.clone();
            move |source: io::Error| EngineError::Persistence {
                operation,
                path,
                source,
            }
        };

        let mut file = File::create(&temp_path).map_err(persist("create"))?;
        file.write_all(&bytes).map_err(persist("write"))?;
        file.sync_all().map_err(persist("sync"))?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|source| {
            let _ = fs::remove_file(&temp_path);
            EngineError::Persistence {
                operation: "rename",
                path: self.path.clone(),
                source,
            }
        })?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Artifact written");
        Ok(())
    }

    /// Read, verify and validate the stored artifact
    pub fn load(&self) -> Result<TrainedArtifact> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::ArtifactNotFound(self.path.clone()))
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(EngineError::ArtifactCorrupt(format!(
                    "{} is not valid UTF-8",
                    self.path.display()
                )))
            }
            Err(source) => {
                return Err(EngineError::Persistence {
                    operation: "read",
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|e| EngineError::ArtifactCorrupt(format!("undecodable envelope: {}", e)))?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(EngineError::ArtifactCorrupt(format!(
                "format version {} is not supported (expected {})",
                envelope.format_version, FORMAT_VERSION
            )));
        }

        let actual = compute_checksum(envelope.artifact.get().as_bytes());
        if actual != envelope.checksum {
            return Err(EngineError::ArtifactCorrupt(format!(
                "checksum mismatch: expected {}, got {}",
                envelope.checksum, actual
            )));
        }

        let artifact: TrainedArtifact = serde_json::from_str(envelope.artifact.get())
            .map_err(|e| EngineError::ArtifactCorrupt(format!("undecodable artifact: {}", e)))?;
        artifact.validate().map_err(EngineError::ArtifactCorrupt)?;

        debug!(path = %self.path.display(), "Artifact loaded");
        Ok(artifact)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

/// SHA-256 hex digest
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

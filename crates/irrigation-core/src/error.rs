//! Error taxonomy for the decision engine

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or physically impossible input
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    /// Too few records, or only one label class
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Artifact I/O failure
    #[error("failed to {operation} artifact at {path:?}: {source}")]
    Persistence {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no artifact found at {0:?}")]
    ArtifactNotFound(PathBuf),

    #[error("artifact is corrupt: {0}")]
    ArtifactCorrupt(String),

    /// Prediction attempted with no trainable or loadable model
    #[error("model not ready: {0}")]
    ModelNotReady(String),

    /// Historical data source failure
    #[error("data source error: {0}")]
    Source(String),

    /// Training settings that cannot produce a model
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Stable machine-readable name, used in API responses and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidReading(_) => "invalid_reading",
            EngineError::InsufficientData(_) => "insufficient_data",
            EngineError::Persistence { .. } => "persistence",
            EngineError::ArtifactNotFound(_) => "artifact_not_found",
            EngineError::ArtifactCorrupt(_) => "artifact_corrupt",
            EngineError::ModelNotReady(_) => "model_not_ready",
            EngineError::Source(_) => "source",
            EngineError::InvalidConfig(_) => "invalid_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            EngineError::InvalidReading("t".into()),
            EngineError::InsufficientData("n".into()),
            EngineError::ArtifactNotFound(PathBuf::from("m.json")),
            EngineError::ArtifactCorrupt("bad".into()),
            EngineError::ModelNotReady("none".into()),
            EngineError::Source("down".into()),
            EngineError::InvalidConfig("zero trees".into()),
        ];
        let mut kinds: Vec<_> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_persistence_error_message() {
        let err = EngineError::Persistence {
            operation: "write",
            path: PathBuf::from("/tmp/model.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("write"));
        assert!(msg.contains("denied"));
    }
}

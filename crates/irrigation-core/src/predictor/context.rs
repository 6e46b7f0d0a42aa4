//! Explicit holder of the current artifact
//!
//! Replaces a process-wide model singleton: whoever owns the context owns
//! the model. The store is read at most once unless [`ModelContext::reload`]
//! is called; a failed load leaves the context empty so the next call
//! retries.

use crate::error::{EngineError, Result};
use crate::store::ModelStore;
use crate::training::TrainedArtifact;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ModelContext {
    store: ModelStore,
    artifact: Option<Arc<TrainedArtifact>>,
}

impl ModelContext {
    pub fn new(store: ModelStore) -> Self {
        Self {
            store,
            artifact: None,
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn is_loaded(&self) -> bool {
        self.artifact.is_some()
    }

    /// Artifact held in memory, without touching the store
    pub fn current(&self) -> Option<Arc<TrainedArtifact>> {
        self.artifact.clone()
    }

    /// Artifact held in memory, loading it from the store on first use
    ///
    /// # Errors
    ///
    /// `ModelNotReady` carrying the load failure as its message.
    pub fn artifact(&mut self) -> Result<Arc<TrainedArtifact>> {
        if let Some(artifact) = &self.artifact {
            return Ok(Arc::clone(artifact));
        }
        self.load_from_store()
    }

    /// Drop the cached artifact and read the store again
    pub fn reload(&mut self) -> Result<Arc<TrainedArtifact>> {
        self.artifact = None;
        self.load_from_store()
    }

    /// Make a freshly trained artifact the current one
    pub fn install(&mut self, artifact: TrainedArtifact) -> Arc<TrainedArtifact> {
        let artifact = Arc::new(artifact);
        self.artifact = Some(Arc::clone(&artifact));
        artifact
    }

    fn load_from_store(&mut self) -> Result<Arc<TrainedArtifact>> {
        match self.store.load() {
            Ok(artifact) => {
                info!(
                    path = %self.store.path().display(),
                    features = artifact.feature_schema.len(),
                    trees = artifact.classifier.n_trees(),
                    "Loaded model artifact"
                );
                Ok(self.install(artifact))
            }
            Err(e) => {
                warn!(
                    path = %self.store.path().display(),
                    kind = e.kind(),
                    error = %e,
                    "Model artifact unavailable"
                );
                Err(EngineError::ModelNotReady(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetAssembler;
    use crate::simulation::ReadingGenerator;
    use crate::training::{ModelTrainer, TrainerConfig};
    use tempfile::TempDir;

    fn trained() -> TrainedArtifact {
        let readings = ReadingGenerator::new(41).generate(150);
        let dataset = DatasetAssembler::default().assemble_readings(&readings).unwrap();
        ModelTrainer::new(TrainerConfig {
            n_estimators: 10,
            ..Default::default()
        })
        .train(&dataset, &[])
        .unwrap()
        .0
    }

    #[test]
    fn test_missing_artifact_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let mut ctx = ModelContext::new(ModelStore::new(dir.path().join("model.json")));
        let err = ctx.artifact().unwrap_err();
        assert!(matches!(err, EngineError::ModelNotReady(ref m) if m.contains("no artifact")));
        assert!(!ctx.is_loaded());
    }

    #[test]
    fn test_failed_load_is_retried() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        let mut ctx = ModelContext::new(store.clone());
        assert!(ctx.artifact().is_err());

        store.save(&trained()).unwrap();
        assert!(ctx.artifact().is_ok());
        assert!(ctx.is_loaded());
    }

    #[test]
    fn test_loads_once_until_reload() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        store.save(&trained()).unwrap();

        let mut ctx = ModelContext::new(store.clone());
        let first = ctx.artifact().unwrap();
        std::fs::remove_file(store.path()).unwrap();
        let second = ctx.artifact().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(ctx.reload().is_err());
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_install_replaces_current() {
        let dir = TempDir::new().unwrap();
        let mut ctx = ModelContext::new(ModelStore::new(dir.path().join("model.json")));
        let installed = ctx.install(trained());
        assert!(Arc::ptr_eq(&installed, &ctx.artifact().unwrap()));
    }
}

//! Server configuration

use anyhow::{Context, Result};
use irrigation_core::EngineConfig;
use serde::Deserialize;
use std::path::Path;

/// Server configuration
///
/// Read from an optional `irrigation.toml` and `IRRIGATION_*` environment
/// variables; nested engine settings use `__`, e.g.
/// `IRRIGATION_ENGINE__SOURCE_URL`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Train at startup when no stored model can be loaded
    #[serde(default)]
    pub train_on_startup: bool,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            train_on_startup: false,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `irrigation.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("irrigation.toml"))
    }

    /// Load from `file` (if present) and the environment
    pub fn load_from(file: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(file).required(false))
            .add_source(
                config::Environment::with_prefix("IRRIGATION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", file.display()))?;

        config
            .try_deserialize()
            .context("Invalid irrigation server configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(!config.train_on_startup);
        assert_eq!(config.engine.max_records, 5000);
    }

    #[test]
    fn test_file_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("irrigation.toml");
        std::fs::write(
            &path,
            r#"
listen_addr = "127.0.0.1:9000"
train_on_startup = true

[engine]
source_url = "http://sensors.local:5000"
artifact_path = "/var/lib/irrigation/model.json"
min_records = 80

[engine.trainer]
n_estimators = 50
"#,
        )
        .unwrap();

        let config = ServerConfig::load_from(&path).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert!(config.train_on_startup);
        assert_eq!(config.engine.source_url, "http://sensors.local:5000");
        assert_eq!(config.engine.min_records, 80);
        assert_eq!(config.engine.trainer.n_estimators, 50);
        assert_eq!(config.engine.trainer.max_depth, 10);
    }
}

//! Engine configuration

use crate::dataset::{DEFAULT_MAX_RECORDS, MIN_RECORDS};
use crate::store::DEFAULT_ARTIFACT_PATH;
use crate::training::TrainerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Records requested from the source for trend analysis
pub const DEFAULT_TRENDS_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Label attached to structured log events
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// Base URL of the historical readings API
    #[serde(default = "default_source_url")]
    pub source_url: String,

    /// HTTP timeout for source requests; no timeout when unset
    #[serde(default)]
    pub source_timeout_secs: Option<u64>,

    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Records requested per training run
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Fewest records a training run accepts
    #[serde(default = "default_min_records")]
    pub min_records: usize,

    #[serde(default = "default_trends_limit")]
    pub trends_limit: usize,

    #[serde(default)]
    pub trainer: TrainerConfig,
}

fn default_site_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "irrigation".to_string())
}

fn default_source_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACT_PATH)
}

fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}

fn default_min_records() -> usize {
    MIN_RECORDS
}

fn default_trends_limit() -> usize {
    DEFAULT_TRENDS_LIMIT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            site_name: default_site_name(),
            source_url: default_source_url(),
            source_timeout_secs: None,
            artifact_path: default_artifact_path(),
            max_records: default_max_records(),
            min_records: default_min_records(),
            trends_limit: default_trends_limit(),
            trainer: TrainerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn source_timeout(&self) -> Option<Duration> {
        self.source_timeout_secs.map(Duration::from_secs)
    }
}

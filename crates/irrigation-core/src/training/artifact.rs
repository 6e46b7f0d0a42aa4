use super::forest::RandomForest;
use super::scaler::StandardScaler;
use crate::models::{Feature, FeatureSchema};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Importance of one feature in the fitted forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: Feature,
    pub importance: f64,
}

/// Everything needed to serve predictions without refitting
///
/// Immutable once trained; shared as `Arc<TrainedArtifact>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub classifier: RandomForest,
    pub scaler: StandardScaler,
    pub feature_schema: FeatureSchema,
    #[serde(default)]
    pub accuracy_history: Vec<f64>,
    /// Absent in artifacts written without a training timestamp
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
    /// Ranked highest first
    #[serde(default)]
    pub feature_importances: Vec<FeatureImportance>,
}

impl TrainedArtifact {
    pub fn latest_accuracy(&self) -> Option<f64> {
        self.accuracy_history.last().copied()
    }

    /// Check that schema, scaler and classifier agree with each other
    pub fn validate(&self) -> Result<(), String> {
        self.feature_schema.validate()?;
        let width = self.feature_schema.len();
        if !self.scaler.is_consistent() {
            return Err("scaler parameters are malformed".to_string());
        }
        if self.scaler.n_features() != width {
            return Err(format!(
                "scaler expects {} features, schema has {}",
                self.scaler.n_features(),
                width
            ));
        }
        if self.classifier.n_features() != width {
            return Err(format!(
                "classifier expects {} features, schema has {}",
                self.classifier.n_features(),
                width
            ));
        }
        if !self.classifier.is_consistent() {
            return Err("classifier trees are malformed".to_string());
        }
        Ok(())
    }
}

//! Model training pipeline
//!
//! Stratified split, scaler fit on the training partition, random forest
//! fit, then evaluation on the held-out rows. Training never touches the
//! store; persistence is the engine's job.

use super::artifact::{FeatureImportance, TrainedArtifact};
use super::forest::{ForestParams, RandomForest};
use super::metrics::ClassificationReport;
use super::scaler::StandardScaler;
use crate::dataset::Dataset;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 2,
        }
    }
}

impl TrainerConfig {
    /// Reject settings the split or the forest cannot work with
    pub fn validate(&self) -> Result<()> {
        let problem = if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            Some(format!("test_fraction must be in (0, 1), got {}", self.test_fraction))
        } else if self.n_estimators == 0 {
            Some("n_estimators must be at least 1".to_string())
        } else if self.max_depth == 0 {
            Some("max_depth must be at least 1".to_string())
        } else if self.min_samples_split < 2 {
            Some(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            ))
        } else {
            None
        };
        match problem {
            Some(message) => Err(EngineError::InvalidConfig(message)),
            None => Ok(()),
        }
    }

    fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            seed: self.seed,
        }
    }
}

/// Label counts over the whole dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub pump_off: usize,
    pub pump_on: usize,
}

/// Evaluation of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub accuracy: f64,
    pub classification_report: ClassificationReport,
    /// Ranked highest first
    pub feature_importances: Vec<FeatureImportance>,
    pub train_size: usize,
    pub test_size: usize,
    pub class_distribution: ClassDistribution,
    pub trained_at: DateTime<Utc>,
}

pub struct ModelTrainer {
    config: TrainerConfig,
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new(TrainerConfig::default())
    }
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Fit a new artifact and evaluate it
    ///
    /// `prior_history` is the accuracy history of the previous artifact; the
    /// returned artifact carries it with the new accuracy appended.
    pub fn train(
        &self,
        dataset: &Dataset,
        prior_history: &[f64],
    ) -> Result<(TrainedArtifact, TrainingReport)> {
        self.config.validate()?;

        let (pump_off, pump_on) = dataset.class_counts();
        if pump_off < 2 || pump_on < 2 {
            return Err(EngineError::InsufficientData(format!(
                "each class needs at least 2 rows to split (pump off {}, pump on {})",
                pump_off, pump_on
            )));
        }

        let (train_idx, test_idx) = self.stratified_split(&dataset.labels);
        debug!(
            train = train_idx.len(),
            test = test_idx.len(),
            "Split dataset"
        );

        let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| dataset.matrix[i].clone()).collect();
        let train_labels: Vec<usize> = train_idx.iter().map(|&i| dataset.labels[i]).collect();

        let scaler = StandardScaler::fit(&train_rows);
        let scaled_train = scaler.transform_batch(&train_rows);

        let classifier = RandomForest::fit(&scaled_train, &train_labels, &self.config.forest_params())
            .map_err(|e| {
                EngineError::InsufficientData(format!("forest fit rejected the training rows: {}", e))
            })?;

        let test_truth: Vec<usize> = test_idx.iter().map(|&i| dataset.labels[i]).collect();
        let test_predicted: Vec<usize> = test_idx
            .iter()
            .map(|&i| classifier.predict(&scaler.transform(&dataset.matrix[i])))
            .collect();
        let classification_report = ClassificationReport::from_predictions(&test_truth, &test_predicted);
        let accuracy = classification_report.accuracy;

        let mut feature_importances: Vec<FeatureImportance> = dataset
            .schema
            .features
            .iter()
            .zip(classifier.feature_importances())
            .map(|(feature, importance)| FeatureImportance {
                feature: *feature,
                importance: *importance,
            })
            .collect();
        // sort_by is stable, ties keep schema order
        feature_importances.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut accuracy_history = prior_history.to_vec();
        accuracy_history.push(accuracy);
        let trained_at = Utc::now();

        info!(
            accuracy = accuracy,
            train = train_idx.len(),
            test = test_idx.len(),
            trees = classifier.n_trees(),
            "Model trained"
        );

        let report = TrainingReport {
            accuracy,
            classification_report,
            feature_importances: feature_importances.clone(),
            train_size: train_idx.len(),
            test_size: test_idx.len(),
            class_distribution: ClassDistribution { pump_off, pump_on },
            trained_at,
        };

        let artifact = TrainedArtifact {
            classifier,
            scaler,
            feature_schema: dataset.schema.clone(),
            accuracy_history,
            trained_at: Some(trained_at),
            feature_importances,
        };

        Ok((artifact, report))
    }

    /// Per-class seeded shuffle; each class keeps at least one row on both sides
    fn stratified_split(&self, labels: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut train = Vec::new();
        let mut test = Vec::new();

        for class in 0..2 {
            let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
            members.shuffle(&mut rng);
            let n_c = members.len();
            let wanted = (n_c as f64 * self.config.test_fraction).round();
            let n_test = if wanted.is_finite() && wanted > 0.0 {
                (wanted as usize).clamp(1, n_c - 1)
            } else {
                1
            };
            test.extend_from_slice(&members[..n_test]);
            train.extend_from_slice(&members[n_test..]);
        }

        train.sort_unstable();
        test.sort_unstable();
        (train, test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetAssembler;
    use crate::simulation::ReadingGenerator;

    fn dataset(seed: u64, count: usize) -> Dataset {
        let readings = ReadingGenerator::new(seed).generate(count);
        DatasetAssembler::default().assemble_readings(&readings).unwrap()
    }

    fn fast_trainer() -> ModelTrainer {
        ModelTrainer::new(TrainerConfig {
            n_estimators: 25,
            ..Default::default()
        })
    }

    #[test]
    fn test_split_is_stratified() {
        let data = dataset(21, 200);
        let trainer = ModelTrainer::default();
        let (train, test) = trainer.stratified_split(&data.labels);
        assert_eq!(train.len() + test.len(), 200);

        let (off, on) = data.class_counts();
        let test_on = test.iter().filter(|&&i| data.labels[i] == 1).count();
        let test_off = test.len() - test_on;
        assert_eq!(test_on, ((on as f64) * 0.2).round() as usize);
        assert_eq!(test_off, ((off as f64) * 0.2).round() as usize);
        assert!(train.iter().all(|i| !test.contains(i)));
    }

    #[test]
    fn test_training_is_deterministic() {
        let data = dataset(22, 300);
        let (a, ra) = fast_trainer().train(&data, &[]).unwrap();
        let (b, rb) = fast_trainer().train(&data, &[]).unwrap();
        assert_eq!(ra.accuracy, rb.accuracy);
        assert_eq!(ra.feature_importances, rb.feature_importances);
        assert_eq!(a.classifier, b.classifier);
    }

    #[test]
    fn test_history_is_appended() {
        let data = dataset(23, 200);
        let (artifact, report) = fast_trainer().train(&data, &[0.81, 0.84]).unwrap();
        assert_eq!(artifact.accuracy_history.len(), 3);
        assert_eq!(artifact.latest_accuracy(), Some(report.accuracy));
        assert_eq!(artifact.accuracy_history[..2], [0.81, 0.84]);
    }

    #[test]
    fn test_artifact_is_valid_and_ranked() {
        let data = dataset(24, 250);
        let (artifact, report) = fast_trainer().train(&data, &[]).unwrap();
        assert!(artifact.validate().is_ok());
        assert_eq!(report.feature_importances.len(), data.schema.len());
        for pair in report.feature_importances.windows(2) {
            assert!(pair[0].importance >= pair[1].importance);
        }
        assert!(report.accuracy > 0.6, "accuracy {}", report.accuracy);
    }

    #[test]
    fn test_tiny_class_rejected() {
        let mut data = dataset(25, 100);
        // leave a single pump-on row
        let mut seen = false;
        for label in data.labels.iter_mut() {
            if *label == 1 {
                if seen {
                    *label = 0;
                }
                seen = true;
            }
        }
        let err = fast_trainer().train(&data, &[]).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn test_bad_config_is_not_a_data_shortage() {
        let data = dataset(26, 200);
        let configs = [
            TrainerConfig { n_estimators: 0, ..Default::default() },
            TrainerConfig { test_fraction: 1.0, ..Default::default() },
            TrainerConfig { max_depth: 0, ..Default::default() },
            TrainerConfig { min_samples_split: 1, ..Default::default() },
        ];
        for config in configs {
            let err = ModelTrainer::new(config.clone()).train(&data, &[]).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidConfig(_)),
                "{:?} gave {:?}",
                config,
                err
            );
        }
        assert!(TrainerConfig::default().validate().is_ok());
    }
}

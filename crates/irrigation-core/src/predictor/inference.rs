//! Single-point irrigation inference
//!
//! Applies the stored scaler and forest to one query. The artifact is only
//! read; nothing is refit at serving time.

use super::context::ModelContext;
use super::features::FeatureBuilder;
use crate::error::Result;
use crate::models::{FeatureSchema, PredictionResult, SensorQuery};
use crate::training::TrainedArtifact;
use chrono::{Datelike, Local, Timelike};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Latency above which an inference is logged as slow
const MAX_INFERENCE_MS: u128 = 5;

pub struct IrrigationPredictor {
    artifact: Arc<TrainedArtifact>,
    builder: FeatureBuilder,
}

impl IrrigationPredictor {
    pub fn new(artifact: Arc<TrainedArtifact>) -> Self {
        Self {
            artifact,
            builder: FeatureBuilder::new(),
        }
    }

    /// Predictor over the context's artifact, loading it if needed
    pub fn from_context(ctx: &mut ModelContext) -> Result<Self> {
        Ok(Self::new(ctx.artifact()?))
    }

    pub fn artifact(&self) -> &Arc<TrainedArtifact> {
        &self.artifact
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.artifact.feature_schema
    }

    /// Predict for the current local time
    ///
    /// `hour` defaults to the current local hour. The day of week is always
    /// the current local weekday.
    pub fn predict(
        &self,
        humidity: f64,
        temperature: f64,
        ph: f64,
        phosphorus_present: bool,
        potassium_present: bool,
        hour: Option<u32>,
    ) -> Result<PredictionResult> {
        let now = Local::now();
        let query = SensorQuery::new(
            humidity,
            temperature,
            ph,
            phosphorus_present,
            potassium_present,
        )
        .at_hour(hour.unwrap_or_else(|| now.hour()))
        .on_day(now.weekday().num_days_from_monday());
        self.predict_query(&query)
    }

    /// Predict for a fully specified query
    pub fn predict_query(&self, query: &SensorQuery) -> Result<PredictionResult> {
        let start = Instant::now();

        let input_features = self.builder.build_query(query, self.schema())?;
        let scaled = self.artifact.scaler.transform(&input_features.values());
        let prediction = self.artifact.classifier.predict_with_proba(&scaled);

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "Inference exceeded {}ms target", MAX_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, "Inference completed");
        }

        Ok(PredictionResult {
            should_irrigate: prediction.class == 1,
            irrigate_probability: prediction.probabilities[1],
            confidence: prediction.confidence(),
            input_features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetAssembler;
    use crate::error::EngineError;
    use crate::models::Feature;
    use crate::simulation::ReadingGenerator;
    use crate::training::ModelTrainer;

    fn predictor() -> IrrigationPredictor {
        let readings = ReadingGenerator::new(51).generate(600);
        let dataset = DatasetAssembler::default().assemble_readings(&readings).unwrap();
        let (artifact, _) = ModelTrainer::default().train(&dataset, &[]).unwrap();
        IrrigationPredictor::new(Arc::new(artifact))
    }

    #[test]
    fn test_dry_hot_soil_needs_irrigation() {
        let p = predictor();
        let result = p
            .predict_query(&SensorQuery::new(20.0, 38.0, 6.0, true, true).at_hour(13).on_day(2))
            .unwrap();
        assert!(result.should_irrigate);
        assert!(result.irrigate_probability > 0.5);
        assert_eq!(result.confidence, result.irrigate_probability);
    }

    #[test]
    fn test_prediction_is_idempotent() {
        let p = predictor();
        let query = SensorQuery::new(55.0, 27.0, 6.7, true, false).at_hour(9).on_day(4);
        let first = p.predict_query(&query).unwrap();
        for _ in 0..5 {
            assert_eq!(p.predict_query(&query).unwrap(), first);
        }
    }

    #[test]
    fn test_features_follow_schema() {
        let p = predictor();
        let result = p.predict(45.0, 25.0, 6.8, true, true, Some(7)).unwrap();
        assert_eq!(result.input_features.features(), p.schema().features);
        assert_eq!(result.input_features.get(Feature::HourOfDay), Some(7.0));
        assert!((0.0..=1.0).contains(&result.irrigate_probability));
        assert!(result.confidence >= 0.5);
    }

    #[test]
    fn test_invalid_temperature_rejected() {
        let p = predictor();
        let err = p.predict(45.0, -3.0, 6.8, true, true, Some(7)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidReading(_)));
    }
}

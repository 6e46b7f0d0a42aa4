//! Descriptive analytics over readings and the trained model

use crate::error::{EngineError, Result};
use crate::models::{Feature, RawReading, SensorQuery};
use crate::predictor::IrrigationPredictor;
use crate::training::{FeatureImportance, TrainedArtifact};
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

/// Importance share below which a feature is reported as marginal
pub const LOW_IMPORTANCE_THRESHOLD: f64 = 0.02;

/// Held-out accuracy below which more training data is recommended
pub const TARGET_ACCURACY: f64 = 0.85;

/// Averages and irrigation counts over a window of readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub readings: usize,
    pub mean_humidity: f64,
    pub mean_temperature: f64,
    pub mean_ph: f64,
    pub pump_on_count: usize,
    /// Hour with the most pump-on readings; smallest hour wins ties
    pub most_irrigated_hour: Option<u32>,
}

/// `None` for an empty slice
pub fn summarize_trends(readings: &[RawReading]) -> Option<TrendSummary> {
    if readings.is_empty() {
        return None;
    }
    let n = readings.len() as f64;
    let mean = |pick: fn(&RawReading) -> f64| readings.iter().map(pick).sum::<f64>() / n;

    let mut by_hour = [0usize; 24];
    let mut pump_on_count = 0;
    for reading in readings.iter().filter(|r| r.pump_on) {
        pump_on_count += 1;
        if let Some(ts) = reading.timestamp {
            by_hour[ts.hour() as usize] += 1;
        }
    }
    let mut most_irrigated_hour = None;
    let mut best = 0;
    for (hour, &count) in (0u32..).zip(by_hour.iter()) {
        if count > best {
            best = count;
            most_irrigated_hour = Some(hour);
        }
    }

    Some(TrendSummary {
        readings: readings.len(),
        mean_humidity: mean(|r| r.humidity),
        mean_temperature: mean(|r| r.temperature),
        mean_ph: mean(|r| r.ph),
        pump_on_count,
        most_irrigated_hour,
    })
}

/// Structural and quality overview of a trained artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub trees: usize,
    pub max_depth: usize,
    pub avg_depth: f64,
    pub total_nodes: usize,
    pub features: Vec<Feature>,
    pub latest_accuracy: Option<f64>,
    pub training_runs: usize,
    pub accuracy_history: Vec<f64>,
    pub scaler_mean: Vec<f64>,
    pub scaler_scale: Vec<f64>,
    pub feature_importances: Vec<FeatureImportance>,
    pub trained_at: Option<DateTime<Utc>>,
}

impl ModelSummary {
    pub fn from_artifact(artifact: &TrainedArtifact) -> Self {
        let forest = &artifact.classifier;
        Self {
            trees: forest.n_trees(),
            max_depth: forest.params().max_depth,
            avg_depth: forest.avg_depth(),
            total_nodes: forest.total_nodes(),
            features: artifact.feature_schema.features.clone(),
            latest_accuracy: artifact.latest_accuracy(),
            training_runs: artifact.accuracy_history.len(),
            accuracy_history: artifact.accuracy_history.clone(),
            scaler_mean: artifact.scaler.mean().to_vec(),
            scaler_scale: artifact.scaler.scale().to_vec(),
            feature_importances: artifact.feature_importances.clone(),
            trained_at: artifact.trained_at,
        }
    }

    /// Features contributing less than [`LOW_IMPORTANCE_THRESHOLD`]
    pub fn low_importance_features(&self) -> Vec<Feature> {
        self.feature_importances
            .iter()
            .filter(|f| f.importance < LOW_IMPORTANCE_THRESHOLD)
            .map(|f| f.feature)
            .collect()
    }

    pub fn accuracy_below_target(&self) -> bool {
        self.latest_accuracy
            .map(|a| a < TARGET_ACCURACY)
            .unwrap_or(false)
    }
}

/// Probability of irrigating at one swept value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensitivityPoint {
    pub value: f64,
    pub probability: f64,
}

/// Fixed operating point the sweeps vary one input around
pub fn sensitivity_base() -> SensorQuery {
    SensorQuery::new(50.0, 25.0, 6.5, true, true)
        .at_hour(12)
        .on_day(2)
}

/// Values swept for `feature`, or `None` if it cannot be swept
pub fn default_sweep(feature: Feature) -> Option<Vec<f64>> {
    match feature {
        Feature::Humidity => Some(vec![10.0, 30.0, 50.0, 70.0, 90.0]),
        Feature::Temperature => Some(vec![15.0, 20.0, 25.0, 30.0, 35.0]),
        Feature::Ph => Some(vec![5.5, 6.0, 6.5, 7.0, 7.5]),
        _ => None,
    }
}

/// Irrigation probability as one sensor input varies from the base point
///
/// Derived features are recomputed for every value.
pub fn sensitivity(
    predictor: &IrrigationPredictor,
    feature: Feature,
    values: &[f64],
) -> Result<Vec<SensitivityPoint>> {
    let base = sensitivity_base();
    values
        .iter()
        .map(|&value| {
            let mut query = base.clone();
            match feature {
                Feature::Humidity => query.humidity = value,
                Feature::Temperature => query.temperature = value,
                Feature::Ph => query.ph = value,
                other => {
                    return Err(EngineError::InvalidReading(format!(
                        "sensitivity sweeps humidity, temperature or ph, not {}",
                        other
                    )))
                }
            }
            let result = predictor.predict_query(&query)?;
            Ok(SensitivityPoint {
                value,
                probability: result.irrigate_probability,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn reading(humidity: f64, pump_on: bool, at: Option<&str>) -> RawReading {
        RawReading {
            humidity,
            temperature: 20.0,
            ph: 6.0,
            phosphorus_present: true,
            potassium_present: true,
            pump_on,
            timestamp: at.map(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()),
        }
    }

    #[test]
    fn test_empty_trends() {
        assert!(summarize_trends(&[]).is_none());
    }

    #[test]
    fn test_trend_summary() {
        let readings = vec![
            reading(30.0, true, Some("2024-01-01 08:00:00")),
            reading(40.0, true, Some("2024-01-01 14:00:00")),
            reading(50.0, true, Some("2024-01-02 14:30:00")),
            reading(60.0, false, Some("2024-01-02 09:00:00")),
        ];
        let summary = summarize_trends(&readings).unwrap();
        assert_eq!(summary.readings, 4);
        assert_eq!(summary.mean_humidity, 45.0);
        assert_eq!(summary.mean_temperature, 20.0);
        assert_eq!(summary.pump_on_count, 3);
        assert_eq!(summary.most_irrigated_hour, Some(14));
    }

    #[test]
    fn test_most_irrigated_hour_tie_and_absence() {
        let tie = vec![
            reading(30.0, true, Some("2024-01-01 16:00:00")),
            reading(30.0, true, Some("2024-01-01 07:00:00")),
        ];
        assert_eq!(summarize_trends(&tie).unwrap().most_irrigated_hour, Some(7));

        let untimed = vec![reading(30.0, true, None), reading(70.0, false, None)];
        let summary = summarize_trends(&untimed).unwrap();
        assert_eq!(summary.pump_on_count, 1);
        assert_eq!(summary.most_irrigated_hour, None);
    }

    #[test]
    fn test_default_sweeps() {
        assert_eq!(default_sweep(Feature::Humidity).unwrap().len(), 5);
        assert!(default_sweep(Feature::HourOfDay).is_none());
        assert_eq!(sensitivity_base().hour_of_day, Some(12));
    }
}

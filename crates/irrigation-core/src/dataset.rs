//! Labeled dataset assembly from historical readings

use crate::error::{EngineError, Result};
use crate::models::{FeatureSchema, RawReading};
use crate::predictor::FeatureBuilder;
use crate::source::HistoricalSource;
use chrono::NaiveDateTime;
use tracing::{debug, info};

/// Minimum number of records required for training
pub const MIN_RECORDS: usize = 50;

/// Default number of records requested from the source
pub const DEFAULT_MAX_RECORDS: usize = 5000;

/// Feature matrix, binary labels and the schema the columns follow
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub matrix: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub schema: FeatureSchema,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// (pump-off count, pump-on count)
    pub fn class_counts(&self) -> (usize, usize) {
        let on = self.labels.iter().filter(|&&l| l == 1).count();
        (self.labels.len() - on, on)
    }
}

/// Pulls readings from a source and turns them into a [`Dataset`]
pub struct DatasetAssembler {
    builder: FeatureBuilder,
    min_records: usize,
}

impl Default for DatasetAssembler {
    fn default() -> Self {
        Self::new(MIN_RECORDS)
    }
}

impl DatasetAssembler {
    pub fn new(min_records: usize) -> Self {
        Self {
            builder: FeatureBuilder::new(),
            min_records,
        }
    }

    pub fn min_records(&self) -> usize {
        self.min_records
    }

    pub fn assemble(
        &self,
        source: &dyn HistoricalSource,
        max_records: usize,
        since: Option<NaiveDateTime>,
    ) -> Result<Dataset> {
        let readings = source.fetch(max_records, since)?;
        debug!(count = readings.len(), "Fetched historical readings");
        self.assemble_readings(&readings)
    }

    /// Build a dataset from readings already fetched
    pub fn assemble_readings(&self, readings: &[RawReading]) -> Result<Dataset> {
        if readings.len() < self.min_records {
            return Err(EngineError::InsufficientData(format!(
                "{} records available, need at least {}",
                readings.len(),
                self.min_records
            )));
        }

        let on = readings.iter().filter(|r| r.pump_on).count();
        let off = readings.len() - on;
        info!(pump_off = off, pump_on = on, "Class distribution");
        if on == 0 || off == 0 {
            return Err(EngineError::InsufficientData(
                "need examples of the pump both on and off".to_string(),
            ));
        }

        let schema = FeatureSchema::default_for(readings.iter().any(|r| r.timestamp.is_some()));
        let matrix = readings
            .iter()
            .map(|r| self.builder.build_row(r, &schema))
            .collect::<Result<Vec<_>>>()?;
        let labels = readings.iter().map(|r| usize::from(r.pump_on)).collect();

        info!(
            records = readings.len(),
            features = schema.len(),
            "Assembled training dataset"
        );

        Ok(Dataset {
            matrix,
            labels,
            schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Feature;
    use crate::simulation::ReadingGenerator;
    use crate::source::StaticSource;

    #[test]
    fn test_too_few_records() {
        let source = StaticSource::new(ReadingGenerator::new(1).generate(30));
        let err = DatasetAssembler::default()
            .assemble(&source, DEFAULT_MAX_RECORDS, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn test_single_class_rejected() {
        let readings: Vec<_> = ReadingGenerator::new(2)
            .generate(200)
            .into_iter()
            .map(|r| RawReading { pump_on: false, ..r })
            .collect();
        let err = DatasetAssembler::default()
            .assemble(&StaticSource::new(readings), DEFAULT_MAX_RECORDS, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn test_rows_align_with_labels() {
        let readings = ReadingGenerator::new(3).generate(120);
        let dataset = DatasetAssembler::default().assemble_readings(&readings).unwrap();
        assert_eq!(dataset.len(), 120);
        assert_eq!(dataset.matrix.len(), 120);
        assert!(dataset.matrix.iter().all(|row| row.len() == dataset.schema.len()));
        for (reading, label) in readings.iter().zip(&dataset.labels) {
            assert_eq!(*label, usize::from(reading.pump_on));
        }
        let (off, on) = dataset.class_counts();
        assert_eq!(off + on, 120);
    }

    #[test]
    fn test_temporal_features_follow_timestamps() {
        let readings = ReadingGenerator::new(4).generate(80);
        let with_ts = DatasetAssembler::default().assemble_readings(&readings).unwrap();
        assert!(with_ts.schema.contains(Feature::HourOfDay));

        let stripped: Vec<_> = readings
            .into_iter()
            .map(|r| RawReading { timestamp: None, ..r })
            .collect();
        let without_ts = DatasetAssembler::default().assemble_readings(&stripped).unwrap();
        assert!(!without_ts.schema.contains(Feature::HourOfDay));
        assert!(!without_ts.schema.contains(Feature::DayOfWeek));
    }

    #[test]
    fn test_max_records_respected() {
        let source = StaticSource::new(ReadingGenerator::new(5).generate(300));
        let dataset = DatasetAssembler::default().assemble(&source, 100, None).unwrap();
        assert_eq!(dataset.len(), 100);
    }
}

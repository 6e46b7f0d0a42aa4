//! Feature derivation for training and inference
//!
//! Turns a reading (or an inference query) into the fixed-order feature
//! vector the scaler and forest expect. Features include the raw sensor
//! values, temporal context when a timestamp is known, and two engineered
//! interactions.

use crate::error::Result;
use crate::models::{Feature, FeatureSchema, FeatureVector, RawReading, SensorQuery};

/// Builds feature vectors from readings
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBuilder;

impl FeatureBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Schema a reading produces when no hint is given
    pub fn schema_for(&self, reading: &RawReading) -> FeatureSchema {
        FeatureSchema::default_for(reading.timestamp.is_some())
    }

    /// Build the vector for a historical reading
    ///
    /// With `schema_hint`, exactly the hinted features are populated in the
    /// hinted order; anything that cannot be derived becomes 0.
    pub fn build(
        &self,
        reading: &RawReading,
        schema_hint: Option<&FeatureSchema>,
    ) -> Result<FeatureVector> {
        let query = SensorQuery::from(reading);
        match schema_hint {
            Some(schema) => self.build_query(&query, schema),
            None => self.build_query(&query, &self.schema_for(reading)),
        }
    }

    /// Build the vector for an inference query in schema order
    pub fn build_query(&self, query: &SensorQuery, schema: &FeatureSchema) -> Result<FeatureVector> {
        query.validate()?;
        let entries = schema
            .features
            .iter()
            .map(|feature| (*feature, feature_value(query, *feature)))
            .collect();
        Ok(FeatureVector::from_entries(entries))
    }

    /// Same as [`build`](Self::build) but returns only the ordered values
    pub fn build_row(&self, reading: &RawReading, schema: &FeatureSchema) -> Result<Vec<f64>> {
        Ok(self.build(reading, Some(schema))?.values())
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn feature_value(query: &SensorQuery, feature: Feature) -> f64 {
    match feature {
        Feature::Humidity => query.humidity,
        Feature::Temperature => query.temperature,
        Feature::Ph => query.ph,
        Feature::PhosphorusPresent => flag(query.phosphorus_present),
        Feature::PotassiumPresent => flag(query.potassium_present),
        Feature::HourOfDay => query.hour_of_day.map(f64::from).unwrap_or(0.0),
        Feature::DayOfWeek => query.day_of_week.map(f64::from).unwrap_or(0.0),
        Feature::HumidityTempRatio => humidity_temp_ratio(query.humidity, query.temperature),
        Feature::PhNutrients => {
            query.ph * (flag(query.phosphorus_present) + flag(query.potassium_present))
        }
    }
}

/// `humidity / (temperature + 1)`; callers validate `temperature > -1`
pub fn humidity_temp_ratio(humidity: f64, temperature: f64) -> f64 {
    humidity / (temperature + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use chrono::NaiveDateTime;

    fn timestamp(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn reading(with_timestamp: bool) -> RawReading {
        RawReading {
            humidity: 45.0,
            temperature: 29.0,
            ph: 6.5,
            phosphorus_present: true,
            potassium_present: false,
            pump_on: true,
            timestamp: with_timestamp.then(|| timestamp("2024-05-13 08:15:00")),
        }
    }

    #[test]
    fn test_keys_match_default_schema() {
        let builder = FeatureBuilder::new();
        for with_ts in [true, false] {
            let r = reading(with_ts);
            let vector = builder.build(&r, None).unwrap();
            assert_eq!(vector.features(), builder.schema_for(&r).features);
        }
    }

    #[test]
    fn test_order_is_stable() {
        let builder = FeatureBuilder::new();
        let r = reading(true);
        let first = builder.build(&r, None).unwrap();
        for _ in 0..10 {
            assert_eq!(builder.build(&r, None).unwrap(), first);
        }
    }

    #[test]
    fn test_derived_features() {
        let v = FeatureBuilder::new().build(&reading(true), None).unwrap();
        assert!((v.get(Feature::HumidityTempRatio).unwrap() - 1.5).abs() < 1e-12);
        assert!((v.get(Feature::PhNutrients).unwrap() - 6.5).abs() < 1e-12);
        assert_eq!(v.get(Feature::HourOfDay), Some(8.0));
        // 2024-05-13 is a Monday
        assert_eq!(v.get(Feature::DayOfWeek), Some(0.0));
    }

    #[test]
    fn test_hint_substitutes_zero_for_missing_timestamp() {
        let schema = FeatureSchema::default_for(true);
        let v = FeatureBuilder::new().build(&reading(false), Some(&schema)).unwrap();
        assert_eq!(v.len(), schema.len());
        assert_eq!(v.features(), schema.features);
        assert_eq!(v.get(Feature::HourOfDay), Some(0.0));
        assert_eq!(v.get(Feature::DayOfWeek), Some(0.0));
    }

    #[test]
    fn test_hint_order_is_followed() {
        let schema = FeatureSchema {
            version: crate::models::FEATURE_SCHEMA_VERSION,
            features: vec![Feature::PhNutrients, Feature::Humidity, Feature::Ph],
        };
        let v = FeatureBuilder::new().build(&reading(true), Some(&schema)).unwrap();
        assert_eq!(v.values(), vec![6.5, 45.0, 6.5]);
    }

    #[test]
    fn test_temperature_at_minus_one_is_invalid() {
        let mut r = reading(false);
        r.temperature = -1.0;
        let err = FeatureBuilder::new().build(&r, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidReading(_)));
    }
}

//! Core data models for the decision engine

use crate::error::{EngineError, Result};
use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Version of the feature schema layout carried inside every artifact
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// One sensor snapshot plus the pump state observed at that time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub humidity: f64,
    pub temperature: f64,
    pub ph: f64,
    pub phosphorus_present: bool,
    pub potassium_present: bool,
    pub pump_on: bool,
    pub timestamp: Option<NaiveDateTime>,
}

impl RawReading {
    /// Create a validated reading
    pub fn new(
        humidity: f64,
        temperature: f64,
        ph: f64,
        phosphorus_present: bool,
        potassium_present: bool,
        pump_on: bool,
        timestamp: Option<NaiveDateTime>,
    ) -> Result<Self> {
        let reading = Self {
            humidity,
            temperature,
            ph,
            phosphorus_present,
            potassium_present,
            pump_on,
            timestamp,
        };
        reading.validate()?;
        Ok(reading)
    }

    pub fn validate(&self) -> Result<()> {
        validate_conditions(self.humidity, self.temperature, self.ph)
    }
}

/// Range checks shared by readings, queries and hourly profiles
pub(crate) fn validate_conditions(humidity: f64, temperature: f64, ph: f64) -> Result<()> {
    if !humidity.is_finite() || !(0.0..=100.0).contains(&humidity) {
        return Err(EngineError::InvalidReading(format!(
            "humidity {} outside [0, 100]",
            humidity
        )));
    }
    // humidity_temp_ratio divides by (temperature + 1)
    if !temperature.is_finite() || temperature <= -1.0 {
        return Err(EngineError::InvalidReading(format!(
            "temperature {} must be greater than -1",
            temperature
        )));
    }
    if !ph.is_finite() || !(0.0..=14.0).contains(&ph) {
        return Err(EngineError::InvalidReading(format!("ph {} outside [0, 14]", ph)));
    }
    Ok(())
}

/// Inference-time input: sensor values plus optional temporal context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorQuery {
    pub humidity: f64,
    pub temperature: f64,
    pub ph: f64,
    pub phosphorus_present: bool,
    pub potassium_present: bool,
    #[serde(default)]
    pub hour_of_day: Option<u32>,
    /// Monday = 0
    #[serde(default)]
    pub day_of_week: Option<u32>,
}

impl SensorQuery {
    pub fn new(
        humidity: f64,
        temperature: f64,
        ph: f64,
        phosphorus_present: bool,
        potassium_present: bool,
    ) -> Self {
        Self {
            humidity,
            temperature,
            ph,
            phosphorus_present,
            potassium_present,
            hour_of_day: None,
            day_of_week: None,
        }
    }

    pub fn at_hour(mut self, hour: u32) -> Self {
        self.hour_of_day = Some(hour);
        self
    }

    pub fn on_day(mut self, day_of_week: u32) -> Self {
        self.day_of_week = Some(day_of_week);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_conditions(self.humidity, self.temperature, self.ph)?;
        if let Some(hour) = self.hour_of_day {
            if hour > 23 {
                return Err(EngineError::InvalidReading(format!("hour {} outside [0, 23]", hour)));
            }
        }
        if let Some(day) = self.day_of_week {
            if day > 6 {
                return Err(EngineError::InvalidReading(format!(
                    "day of week {} outside [0, 6]",
                    day
                )));
            }
        }
        Ok(())
    }
}

impl From<&RawReading> for SensorQuery {
    fn from(reading: &RawReading) -> Self {
        use chrono::{Datelike, Timelike};
        Self {
            humidity: reading.humidity,
            temperature: reading.temperature,
            ph: reading.ph,
            phosphorus_present: reading.phosphorus_present,
            potassium_present: reading.potassium_present,
            hour_of_day: reading.timestamp.map(|t| t.hour()),
            day_of_week: reading.timestamp.map(|t| t.weekday().num_days_from_monday()),
        }
    }
}

/// Named model input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Humidity,
    Temperature,
    Ph,
    PhosphorusPresent,
    PotassiumPresent,
    HourOfDay,
    DayOfWeek,
    HumidityTempRatio,
    PhNutrients,
}

impl Feature {
    pub const BASE: [Feature; 5] = [
        Feature::Humidity,
        Feature::Temperature,
        Feature::Ph,
        Feature::PhosphorusPresent,
        Feature::PotassiumPresent,
    ];
    pub const TEMPORAL: [Feature; 2] = [Feature::HourOfDay, Feature::DayOfWeek];
    pub const DERIVED: [Feature; 2] = [Feature::HumidityTempRatio, Feature::PhNutrients];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Humidity => "humidity",
            Feature::Temperature => "temperature",
            Feature::Ph => "ph",
            Feature::PhosphorusPresent => "phosphorus_present",
            Feature::PotassiumPresent => "potassium_present",
            Feature::HourOfDay => "hour_of_day",
            Feature::DayOfWeek => "day_of_week",
            Feature::HumidityTempRatio => "humidity_temp_ratio",
            Feature::PhNutrients => "ph_nutrients",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered feature list fixed at training time
///
/// The scaler and classifier are positional, so the order stored here is
/// the only thing tying a serving-time vector to its training columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub features: Vec<Feature>,
}

impl FeatureSchema {
    /// Base features, temporal features when available, then derived features
    pub fn default_for(include_temporal: bool) -> Self {
        let mut features = Feature::BASE.to_vec();
        if include_temporal {
            features.extend_from_slice(&Feature::TEMPORAL);
        }
        features.extend_from_slice(&Feature::DERIVED);
        Self {
            version: FEATURE_SCHEMA_VERSION,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.features.iter().map(Feature::as_str).collect()
    }

    /// Check the structural invariants of a schema read back from storage
    ///
    /// Features must follow the layout [`default_for`](Self::default_for)
    /// produces.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.version != FEATURE_SCHEMA_VERSION {
            return Err(format!(
                "feature schema version {} is not supported (expected {})",
                self.version, FEATURE_SCHEMA_VERSION
            ));
        }
        if self.features.is_empty() {
            return Err("feature schema is empty".to_string());
        }
        for (i, feature) in self.features.iter().enumerate() {
            if self.features[..i].contains(feature) {
                return Err(format!("feature {} appears more than once", feature));
            }
        }
        for required in Feature::BASE.iter().chain(Feature::DERIVED.iter()) {
            if !self.contains(*required) {
                return Err(format!("feature schema is missing {}", required));
            }
        }
        let canonical = Self::default_for(self.contains(Feature::HourOfDay));
        if self.features != canonical.features {
            return Err(format!(
                "feature order [{}] does not match [{}]",
                self.names().join(", "),
                canonical.names().join(", ")
            ));
        }
        Ok(())
    }
}

/// Fixed-order numeric encoding of a reading
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(Feature, f64)>,
}

impl FeatureVector {
    pub(crate) fn from_entries(entries: Vec<(Feature, f64)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.entries
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, v)| *v)
    }

    pub fn features(&self) -> Vec<Feature> {
        self.entries.iter().map(|(f, _)| *f).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Feature, f64)> {
        self.entries.iter()
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (feature, value) in &self.entries {
            map.serialize_entry(feature.as_str(), value)?;
        }
        map.end()
    }
}

/// Outcome of a single irrigation query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub should_irrigate: bool,
    pub irrigate_probability: f64,
    pub confidence: f64,
    pub input_features: FeatureVector,
}

/// Forecast conditions for one hour of the day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyConditions {
    pub humidity: f64,
    pub temperature: f64,
    pub ph: f64,
}

impl HourlyConditions {
    pub const fn new(humidity: f64, temperature: f64, ph: f64) -> Self {
        Self {
            humidity,
            temperature,
            ph,
        }
    }

    pub fn summary(&self) -> String {
        format!("H:{}% T:{}°C pH:{}", self.humidity, self.temperature, self.ph)
    }
}

/// Score for one hour of the day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub hour: u32,
    pub should_irrigate: bool,
    pub probability: f64,
    pub confidence: f64,
    pub condition_summary: String,
}

/// Hours of a day ranked by irrigation probability, highest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schedule {
    pub entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top(&self, n: usize) -> &[ScheduleEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Number of hours the model says require irrigation
    pub fn irrigation_hours(&self) -> usize {
        self.entries.iter().filter(|e| e.should_irrigate).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_validation() {
        assert!(RawReading::new(45.0, 25.0, 6.8, true, false, false, None).is_ok());
        assert!(RawReading::new(120.0, 25.0, 6.8, true, false, false, None).is_err());
        assert!(RawReading::new(45.0, -1.0, 6.8, true, false, false, None).is_err());
        assert!(RawReading::new(45.0, f64::NAN, 6.8, true, false, false, None).is_err());
        assert!(RawReading::new(45.0, 25.0, 15.0, true, false, false, None).is_err());
    }

    #[test]
    fn test_query_rejects_bad_hour() {
        let query = SensorQuery::new(45.0, 25.0, 6.8, true, true).at_hour(24);
        assert!(matches!(query.validate(), Err(EngineError::InvalidReading(_))));
        let query = SensorQuery::new(45.0, 25.0, 6.8, true, true).on_day(7);
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_query_from_timestamped_reading() {
        let ts = NaiveDateTime::parse_from_str("2024-03-06 14:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let reading = RawReading::new(50.0, 20.0, 6.5, true, true, true, Some(ts)).unwrap();
        let query = SensorQuery::from(&reading);
        assert_eq!(query.hour_of_day, Some(14));
        // 2024-03-06 is a Wednesday
        assert_eq!(query.day_of_week, Some(2));
    }

    #[test]
    fn test_default_schema_order() {
        let schema = FeatureSchema::default_for(true);
        assert_eq!(
            schema.names(),
            vec![
                "humidity",
                "temperature",
                "ph",
                "phosphorus_present",
                "potassium_present",
                "hour_of_day",
                "day_of_week",
                "humidity_temp_ratio",
                "ph_nutrients",
            ]
        );
        assert_eq!(FeatureSchema::default_for(false).len(), 7);
    }

    #[test]
    fn test_schema_validation() {
        assert!(FeatureSchema::default_for(true).validate().is_ok());

        let mut missing = FeatureSchema::default_for(false);
        missing.features.retain(|f| *f != Feature::PhNutrients);
        assert!(missing.validate().is_err());

        let mut duplicated = FeatureSchema::default_for(false);
        duplicated.features.push(Feature::Humidity);
        assert!(duplicated.validate().is_err());

        let mut reordered = FeatureSchema::default_for(true);
        reordered.features.swap(0, 1);
        assert!(reordered.validate().unwrap_err().contains("order"));

        let mut half_temporal = FeatureSchema::default_for(false);
        half_temporal.features.insert(5, Feature::DayOfWeek);
        assert!(half_temporal.validate().is_err());

        let mut future = FeatureSchema::default_for(false);
        future.version = FEATURE_SCHEMA_VERSION + 1;
        assert!(future.validate().is_err());
    }

    #[test]
    fn test_feature_vector_serializes_in_order() {
        let vector = FeatureVector::from_entries(vec![
            (Feature::Ph, 6.5),
            (Feature::Humidity, 40.0),
        ]);
        let json = serde_json::to_string(&vector).unwrap();
        assert_eq!(json, r#"{"ph":6.5,"humidity":40.0}"#);
    }

    #[test]
    fn test_condition_summary_format() {
        let conditions = HourlyConditions::new(70.0, 22.0, 6.5);
        assert_eq!(conditions.summary(), "H:70% T:22°C pH:6.5");
    }
}

//! Seeded reading generator
//!
//! Produces readings with the same time-of-day bands and pump rules the
//! ingestion simulator uses, so tests and local runs have realistic
//! training data. It is a stand-in for field data, not a model of it.

use crate::models::RawReading;
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Minutes between consecutive generated readings
const READING_SPACING_MINUTES: i64 = 37;

/// Probability of the pump staying off regardless of conditions
const SKIP_PROBABILITY: f64 = 0.1;

pub struct ReadingGenerator {
    rng: StdRng,
    start: NaiveDateTime,
    noise: bool,
}

impl ReadingGenerator {
    pub fn new(seed: u64) -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid generator start date");
        Self {
            rng: StdRng::seed_from_u64(seed),
            start,
            noise: true,
        }
    }

    /// Disable the random pump rules so labels follow the conditions only
    pub fn without_noise(mut self) -> Self {
        self.noise = false;
        self
    }

    pub fn generate(&mut self, count: usize) -> Vec<RawReading> {
        (0..count)
            .map(|i| {
                let ts = self.start + Duration::minutes(i as i64 * READING_SPACING_MINUTES);
                self.reading_at(ts)
            })
            .collect()
    }

    pub fn reading_at(&mut self, timestamp: NaiveDateTime) -> RawReading {
        let (base_humidity, base_temp, chance): (f64, f64, f64) = match timestamp.hour() {
            6..=10 => (self.rng.random_range(60.0..85.0), self.rng.random_range(18.0..25.0), 0.7),
            11..=16 => (self.rng.random_range(35.0..65.0), self.rng.random_range(25.0..35.0), 0.8),
            17..=21 => (self.rng.random_range(50.0..75.0), self.rng.random_range(20.0..28.0), 0.6),
            _ => (self.rng.random_range(70.0..90.0), self.rng.random_range(15.0..22.0), 0.3),
        };

        let humidity_jitter: f64 = self.rng.random_range(-15.0..15.0);
        let temp_jitter: f64 = self.rng.random_range(-5.0..5.0);
        let humidity = round2((base_humidity + humidity_jitter).clamp(10.0, 100.0));
        let temperature = round2((base_temp + temp_jitter).clamp(5.0, 45.0));
        let ph = round2(self.rng.random_range(5.5..8.0));
        let phosphorus_present = self.rng.random_bool(0.5);
        let potassium_present = self.rng.random_bool(0.5);

        let mut pump_on = humidity < 40.0
            || (humidity < 55.0 && temperature > 30.0)
            || ((!phosphorus_present || !potassium_present) && humidity < 60.0);
        if self.noise {
            if !pump_on && self.rng.random::<f64>() < chance * 0.3 {
                pump_on = true;
            }
            if self.rng.random::<f64>() < SKIP_PROBABILITY {
                pump_on = false;
            }
        }

        RawReading {
            humidity,
            temperature,
            ph,
            phosphorus_present,
            potassium_present,
            pump_on,
            timestamp: Some(timestamp),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_readings() {
        let a = ReadingGenerator::new(7).generate(50);
        let b = ReadingGenerator::new(7).generate(50);
        assert_eq!(a, b);
    }

    #[test]
    fn test_readings_are_valid_and_mixed() {
        let readings = ReadingGenerator::new(11).generate(500);
        assert!(readings.iter().all(|r| r.validate().is_ok()));
        let on = readings.iter().filter(|r| r.pump_on).count();
        assert!(on > 50 && on < 450, "pump on in {} of 500", on);
    }

    #[test]
    fn test_noise_free_rule() {
        let readings = ReadingGenerator::new(13).without_noise().generate(300);
        for r in readings.iter().filter(|r| r.humidity < 40.0) {
            assert!(r.pump_on);
        }
    }
}

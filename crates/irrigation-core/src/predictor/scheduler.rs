//! Daily irrigation schedule ranking
//!
//! Scores every hour of a day against an hourly conditions profile and
//! orders the hours by irrigation probability.

use super::inference::IrrigationPredictor;
use crate::error::{EngineError, Result};
use crate::models::{validate_conditions, HourlyConditions, Schedule, ScheduleEntry, SensorQuery};
use chrono::{Datelike, Local};
use tracing::debug;

pub const HOURS_PER_DAY: usize = 24;

const MORNING: HourlyConditions = HourlyConditions::new(70.0, 22.0, 6.5);
const AFTERNOON: HourlyConditions = HourlyConditions::new(45.0, 32.0, 6.8);
const EVENING: HourlyConditions = HourlyConditions::new(60.0, 25.0, 6.6);
const OVERNIGHT: HourlyConditions = HourlyConditions::new(80.0, 18.0, 6.4);

/// Synthetic 24-hour profile used when no forecast is supplied
///
/// Fixed time-of-day bands: 06-10 morning, 11-16 afternoon, 17-21 evening,
/// everything else overnight. Deterministic; not a forecast.
pub fn default_profile() -> Vec<HourlyConditions> {
    (0..HOURS_PER_DAY as u32)
        .map(|hour| match hour {
            6..=10 => MORNING,
            11..=16 => AFTERNOON,
            17..=21 => EVENING,
            _ => OVERNIGHT,
        })
        .collect()
}

pub struct ScheduleOptimizer<'a> {
    predictor: &'a IrrigationPredictor,
    day_of_week: Option<u32>,
}

impl<'a> ScheduleOptimizer<'a> {
    pub fn new(predictor: &'a IrrigationPredictor) -> Self {
        Self {
            predictor,
            day_of_week: None,
        }
    }

    /// Score the hours as if on `day_of_week` (Monday = 0) instead of today
    pub fn on_day(mut self, day_of_week: u32) -> Self {
        self.day_of_week = Some(day_of_week);
        self
    }

    /// Rank the 24 hours of `profile`, or of [`default_profile`] when absent
    ///
    /// Nutrients are assumed present. Ties keep hour order.
    pub fn optimize(&self, profile: Option<&[HourlyConditions]>) -> Result<Schedule> {
        let default;
        let profile = match profile {
            Some(p) => p,
            None => {
                default = default_profile();
                &default[..]
            }
        };
        if profile.len() != HOURS_PER_DAY {
            return Err(EngineError::InvalidReading(format!(
                "profile has {} hours, expected {}",
                profile.len(),
                HOURS_PER_DAY
            )));
        }
        for conditions in profile {
            validate_conditions(conditions.humidity, conditions.temperature, conditions.ph)?;
        }

        let day = self
            .day_of_week
            .unwrap_or_else(|| Local::now().weekday().num_days_from_monday());

        let mut entries = Vec::with_capacity(HOURS_PER_DAY);
        for (hour, conditions) in (0u32..).zip(profile) {
            let query = SensorQuery::new(
                conditions.humidity,
                conditions.temperature,
                conditions.ph,
                true,
                true,
            )
            .at_hour(hour)
            .on_day(day);
            let result = self.predictor.predict_query(&query)?;
            entries.push(ScheduleEntry {
                hour,
                should_irrigate: result.should_irrigate,
                probability: result.irrigate_probability,
                confidence: result.confidence,
                condition_summary: conditions.summary(),
            });
        }

        entries.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let schedule = Schedule { entries };
        debug!(
            irrigation_hours = schedule.irrigation_hours(),
            best_hour = schedule.entries.first().map(|e| e.hour),
            "Schedule ranked"
        );
        Ok(schedule)
    }
}

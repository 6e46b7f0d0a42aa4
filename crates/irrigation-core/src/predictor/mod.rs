//! Irrigation prediction: features, model context, inference, scheduling

mod context;
mod features;
mod inference;
mod scheduler;

pub use context::ModelContext;
pub use features::{humidity_temp_ratio, FeatureBuilder};
pub use inference::IrrigationPredictor;
pub use scheduler::{default_profile, ScheduleOptimizer, HOURS_PER_DAY};

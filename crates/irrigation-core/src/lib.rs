//! Irrigation decision engine
//!
//! This crate provides the core functionality for:
//! - Feature derivation from raw soil/environment readings
//! - Dataset assembly from a historical data source
//! - Random forest training with a reproducible seed
//! - Artifact persistence and validated reload
//! - Single-point irrigation prediction and daily schedule ranking
//! - Descriptive analytics and observability

pub mod analysis;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod simulation;
pub mod source;
pub mod store;
pub mod training;

pub use config::EngineConfig;
pub use engine::{IrrigationEngine, TrainOutcome};
pub use error::{EngineError, Result};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};

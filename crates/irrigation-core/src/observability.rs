//! Observability for the decision engine
//!
//! Provides:
//! - Prometheus metrics (prediction latency, training duration, accuracy, counters)
//! - Structured JSON logging of engine events with tracing

use prometheus::{
    register_gauge, register_histogram, register_int_counter, Gauge, Histogram, IntCounter,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for single predictions (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Histogram buckets for training runs (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    prediction_latency_seconds: Histogram,
    training_duration_seconds: Histogram,
    model_accuracy: Gauge,
    predictions: IntCounter,
    prediction_errors: IntCounter,
    schedules: IntCounter,
    training_runs: IntCounter,
    persistence_errors: IntCounter,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "irrigation_prediction_latency_seconds",
                "Time spent scoring a single irrigation query",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            training_duration_seconds: register_histogram!(
                "irrigation_training_duration_seconds",
                "Time spent assembling data and fitting a model",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            model_accuracy: register_gauge!(
                "irrigation_model_accuracy",
                "Held-out accuracy of the most recently trained model"
            )
            .expect("Failed to register model_accuracy"),

            predictions: register_int_counter!(
                "irrigation_predictions_total",
                "Total number of irrigation predictions served"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter!(
                "irrigation_prediction_errors_total",
                "Total number of failed prediction requests"
            )
            .expect("Failed to register prediction_errors_total"),

            schedules: register_int_counter!(
                "irrigation_schedules_total",
                "Total number of daily schedules generated"
            )
            .expect("Failed to register schedules_total"),

            training_runs: register_int_counter!(
                "irrigation_training_runs_total",
                "Total number of completed training runs"
            )
            .expect("Failed to register training_runs_total"),

            persistence_errors: register_int_counter!(
                "irrigation_persistence_errors_total",
                "Total number of artifact save failures"
            )
            .expect("Failed to register persistence_errors_total"),
        }
    }
}

/// Handle to the global engine metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn set_model_accuracy(&self, accuracy: f64) {
        self.inner().model_accuracy.set(accuracy);
    }

    pub fn inc_predictions(&self) {
        self.inner().predictions.inc();
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    pub fn inc_schedules(&self) {
        self.inner().schedules.inc();
    }

    pub fn inc_training_runs(&self) {
        self.inner().training_runs.inc();
    }

    pub fn inc_persistence_errors(&self) {
        self.inner().persistence_errors.inc();
    }
}

/// Structured logger for engine events
#[derive(Clone)]
pub struct StructuredLogger {
    site: String,
}

impl StructuredLogger {
    pub fn new(site: impl Into<String>) -> Self {
        Self { site: site.into() }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn log_model_trained(&self, accuracy: f64, records: usize, features: usize, top_feature: &str) {
        info!(
            event = "model_trained",
            site = %self.site,
            accuracy = accuracy,
            records = records,
            features = features,
            top_feature = %top_feature,
            "Irrigation model trained"
        );
    }

    pub fn log_artifact_saved(&self, path: &Path) {
        info!(
            event = "artifact_saved",
            site = %self.site,
            path = %path.display(),
            "Model artifact saved"
        );
    }

    pub fn log_artifact_save_failed(&self, path: &Path, error: &str) {
        warn!(
            event = "artifact_save_failed",
            site = %self.site,
            path = %path.display(),
            error = %error,
            "Model artifact could not be saved, keeping in-memory model"
        );
    }

    pub fn log_prediction(&self, should_irrigate: bool, probability: f64, confidence: f64) {
        info!(
            event = "prediction_generated",
            site = %self.site,
            should_irrigate = should_irrigate,
            probability = probability,
            confidence = confidence,
            "Generated irrigation prediction"
        );
    }

    pub fn log_schedule(&self, irrigation_hours: usize, best_hour: Option<u32>) {
        info!(
            event = "schedule_generated",
            site = %self.site,
            irrigation_hours = irrigation_hours,
            best_hour = ?best_hour,
            "Generated daily irrigation schedule"
        );
    }

    pub fn log_startup(&self, version: &str, listen_addr: &str, model_loaded: bool) {
        info!(
            event = "server_started",
            site = %self.site,
            version = %version,
            listen_addr = %listen_addr,
            model_loaded = model_loaded,
            "Irrigation server started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            site = %self.site,
            reason = %reason,
            "Irrigation server shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_metrics_creation() {
        let metrics = EngineMetrics::new();
        metrics.observe_prediction_latency(0.0004);
        metrics.observe_training_duration(1.5);
        metrics.set_model_accuracy(0.91);
        metrics.inc_predictions();
        metrics.inc_schedules();
        metrics.inc_training_runs();
        metrics.inc_persistence_errors();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "irrigation_model_accuracy"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("greenhouse-1");
        assert_eq!(logger.site(), "greenhouse-1");
    }
}

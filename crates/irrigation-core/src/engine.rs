//! Engine facade tying source, training, storage and prediction together
//!
//! Owns the [`ModelContext`], so the artifact lifetime is explicit: it is
//! loaded lazily from the store, replaced in memory after every successful
//! training run, and saved afterwards. A save failure does not undo the
//! training; the caller gets [`TrainOutcome::Unsaved`] and the new model
//! keeps serving.

use crate::analysis::{self, ModelSummary, SensitivityPoint, TrendSummary};
use crate::config::EngineConfig;
use crate::dataset::DatasetAssembler;
use crate::error::{EngineError, Result};
use crate::models::{Feature, HourlyConditions, PredictionResult, Schedule, SensorQuery};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::predictor::{IrrigationPredictor, ModelContext, ScheduleOptimizer};
use crate::source::{HistoricalSource, HttpSource};
use crate::store::ModelStore;
use crate::training::{ModelTrainer, TrainedArtifact, TrainingReport};
use chrono::{Duration, Local};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Result of a training run that produced a model
#[derive(Debug)]
pub enum TrainOutcome {
    /// Trained, installed and written to `path`
    Persisted { report: TrainingReport, path: PathBuf },
    /// Trained and installed in memory, but the save failed
    Unsaved {
        report: TrainingReport,
        error: EngineError,
    },
}

impl TrainOutcome {
    pub fn report(&self) -> &TrainingReport {
        match self {
            TrainOutcome::Persisted { report, .. } | TrainOutcome::Unsaved { report, .. } => report,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, TrainOutcome::Persisted { .. })
    }
}

pub struct IrrigationEngine {
    config: EngineConfig,
    source: Box<dyn HistoricalSource>,
    context: ModelContext,
    assembler: DatasetAssembler,
    trainer: ModelTrainer,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl IrrigationEngine {
    pub fn new(config: EngineConfig, source: Box<dyn HistoricalSource>) -> Self {
        let context = ModelContext::new(ModelStore::new(config.artifact_path.clone()));
        Self {
            assembler: DatasetAssembler::new(config.min_records),
            trainer: ModelTrainer::new(config.trainer.clone()),
            logger: StructuredLogger::new(config.site_name.clone()),
            metrics: EngineMetrics::new(),
            source,
            context,
            config,
        }
    }

    /// Engine reading history from the HTTP API at `config.source_url`
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let source = HttpSource::new(&config.source_url, config.source_timeout())?;
        Ok(Self::new(config, Box::new(source)))
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Whether a model is held in memory (does not touch the store)
    pub fn is_ready(&self) -> bool {
        self.context.is_loaded()
    }

    /// Current artifact, loading it from the store if needed
    pub fn load_model(&mut self) -> Result<Arc<TrainedArtifact>> {
        self.context.artifact()
    }

    /// Fetch history, train, install the new model, then persist it
    pub fn train(&mut self) -> Result<TrainOutcome> {
        let start = Instant::now();

        let prior_history = match self.context.artifact() {
            Ok(artifact) => artifact.accuracy_history.clone(),
            Err(_) => Vec::new(),
        };

        let dataset = self
            .assembler
            .assemble(self.source.as_ref(), self.config.max_records, None)?;
        let (artifact, report) = self.trainer.train(&dataset, &prior_history)?;

        self.metrics
            .observe_training_duration(start.elapsed().as_secs_f64());
        self.metrics.inc_training_runs();
        self.metrics.set_model_accuracy(report.accuracy);
        self.logger.log_model_trained(
            report.accuracy,
            dataset.len(),
            dataset.schema.len(),
            report
                .feature_importances
                .first()
                .map(|f| f.feature.as_str())
                .unwrap_or("none"),
        );

        let artifact = self.context.install(artifact);
        let store = self.context.store();
        match store.save(&artifact) {
            Ok(()) => {
                self.logger.log_artifact_saved(store.path());
                Ok(TrainOutcome::Persisted {
                    report,
                    path: store.path().to_path_buf(),
                })
            }
            Err(error) => {
                self.metrics.inc_persistence_errors();
                self.logger
                    .log_artifact_save_failed(store.path(), &error.to_string());
                Ok(TrainOutcome::Unsaved { report, error })
            }
        }
    }

    fn predictor(&mut self) -> Result<IrrigationPredictor> {
        IrrigationPredictor::from_context(&mut self.context)
    }

    pub fn predict(&mut self, query: &SensorQuery) -> Result<PredictionResult> {
        let start = Instant::now();
        let result = self.predictor().and_then(|p| p.predict_query(query));
        self.record_prediction(start, result)
    }

    /// Predict for the current local time; `hour` defaults to now
    pub fn predict_now(
        &mut self,
        humidity: f64,
        temperature: f64,
        ph: f64,
        phosphorus_present: bool,
        potassium_present: bool,
        hour: Option<u32>,
    ) -> Result<PredictionResult> {
        let start = Instant::now();
        let result = self.predictor().and_then(|p| {
            p.predict(
                humidity,
                temperature,
                ph,
                phosphorus_present,
                potassium_present,
                hour,
            )
        });
        self.record_prediction(start, result)
    }

    fn record_prediction(
        &self,
        start: Instant,
        result: Result<PredictionResult>,
    ) -> Result<PredictionResult> {
        match &result {
            Ok(prediction) => {
                self.metrics
                    .observe_prediction_latency(start.elapsed().as_secs_f64());
                self.metrics.inc_predictions();
                self.logger.log_prediction(
                    prediction.should_irrigate,
                    prediction.irrigate_probability,
                    prediction.confidence,
                );
            }
            Err(e) => {
                self.metrics.inc_prediction_errors();
                debug!(kind = e.kind(), error = %e, "Prediction failed");
            }
        }
        result
    }

    /// Rank the hours of a day; `None` uses the synthetic default profile
    pub fn optimize_schedule(&mut self, profile: Option<&[HourlyConditions]>) -> Result<Schedule> {
        let predictor = self.predictor()?;
        let schedule = ScheduleOptimizer::new(&predictor).optimize(profile)?;
        self.metrics.inc_schedules();
        self.logger.log_schedule(
            schedule.irrigation_hours(),
            schedule.entries.first().map(|e| e.hour),
        );
        Ok(schedule)
    }

    /// Summarize readings from the last `days` days; `None` if there are none
    ///
    /// A window reaching past the representable date range is rejected as
    /// `InvalidReading`.
    pub fn analyze_trends(&self, days: u32) -> Result<Option<TrendSummary>> {
        let since = Duration::try_days(i64::from(days))
            .and_then(|window| Local::now().naive_local().checked_sub_signed(window))
            .ok_or_else(|| {
                EngineError::InvalidReading(format!("trend window of {} days is out of range", days))
            })?;
        let readings = self.source.fetch(self.config.trends_limit, Some(since))?;
        debug!(days = days, readings = readings.len(), "Analyzing trends");
        Ok(analysis::summarize_trends(&readings))
    }

    pub fn model_summary(&mut self) -> Result<ModelSummary> {
        let artifact = self.context.artifact()?;
        Ok(ModelSummary::from_artifact(&artifact))
    }

    /// Sweep one sensor input; `values` defaults to the standard sweep
    pub fn sensitivity(
        &mut self,
        feature: Feature,
        values: Option<&[f64]>,
    ) -> Result<Vec<SensitivityPoint>> {
        let sweep = match values {
            Some(values) => values.to_vec(),
            None => analysis::default_sweep(feature).ok_or_else(|| {
                EngineError::InvalidReading(format!("no default sweep for {}", feature))
            })?,
        };
        let predictor = self.predictor()?;
        analysis::sensitivity(&predictor, feature, &sweep)
    }
}

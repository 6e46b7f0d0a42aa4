//! HTTP API for predictions, schedules, training, health checks and metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Datelike, Local, Timelike};
use irrigation_core::analysis::{ModelSummary, SensitivityPoint, TrendSummary};
use irrigation_core::models::{Feature, HourlyConditions, PredictionResult, Schedule, SensorQuery};
use irrigation_core::training::TrainingReport;
use irrigation_core::{EngineError, IrrigationEngine, TrainOutcome};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Shared application state
pub struct AppState {
    engine: Arc<Mutex<IrrigationEngine>>,
    ready: AtomicBool,
}

impl AppState {
    pub fn new(engine: IrrigationEngine) -> Self {
        let ready = AtomicBool::new(engine.is_ready());
        Self {
            engine: Arc::new(Mutex::new(engine)),
            ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Run `f` against the engine on the blocking pool
    ///
    /// Engine calls block on source and artifact I/O, so they never run on
    /// the async workers. A poisoned lock is recovered so one panicked
    /// request does not fail every later one.
    pub async fn call<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut IrrigationEngine) -> irrigation_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let (result, ready) = tokio::task::spawn_blocking(move || {
            let mut guard = engine.lock().unwrap_or_else(|poisoned| {
                warn!("Recovering engine after a panicked request");
                engine.clear_poison();
                PoisonError::into_inner(poisoned)
            });
            let result = f(&mut *guard).map_err(ApiError::Engine);
            (result, guard.is_ready())
        })
        .await
        .map_err(|e| ApiError::Internal(format!("engine task failed: {}", e)))?;

        self.ready.store(ready, Ordering::Relaxed);
        result
    }
}

/// Error response: `{"error": "...", "kind": "..."}`
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(e) => match e {
                EngineError::InvalidReading(_) => StatusCode::BAD_REQUEST,
                EngineError::InsufficientData(_) => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::ModelNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Source(_) => StatusCode::BAD_GATEWAY,
                EngineError::Persistence { .. }
                | EngineError::InvalidConfig(_)
                | EngineError::ArtifactNotFound(_)
                | EngineError::ArtifactCorrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Engine(e) => e.kind(),
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Engine(e) => e.to_string(),
            ApiError::Internal(m) => m.clone(),
        };
        if status.is_server_error() {
            error!(kind = self.kind(), error = %message, "Request failed");
        }
        (status, Json(json!({ "error": message, "kind": self.kind() }))).into_response()
    }
}

/// Liveness: the process is serving requests
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Readiness: a model is loaded and predictions can be served
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.is_ready();
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(json!({ "ready": ready })))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Missing hour or weekday default to the server's local clock
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(mut query): Json<SensorQuery>,
) -> Result<Json<PredictionResult>, ApiError> {
    let now = Local::now();
    query.hour_of_day.get_or_insert(now.hour());
    query
        .day_of_week
        .get_or_insert(now.weekday().num_days_from_monday());
    let result = state.call(move |engine| engine.predict(&query)).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub profile: Vec<HourlyConditions>,
}

async fn default_schedule(State(state): State<Arc<AppState>>) -> Result<Json<Schedule>, ApiError> {
    let schedule = state.call(|engine| engine.optimize_schedule(None)).await?;
    Ok(Json(schedule))
}

async fn profile_schedule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<Schedule>, ApiError> {
    let schedule = state
        .call(move |engine| engine.optimize_schedule(Some(&request.profile)))
        .await?;
    Ok(Json(schedule))
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
    pub report: TrainingReport,
}

impl From<TrainOutcome> for TrainResponse {
    fn from(outcome: TrainOutcome) -> Self {
        match outcome {
            TrainOutcome::Persisted { report, path } => Self {
                persisted: true,
                artifact_path: Some(path),
                save_error: None,
                report,
            },
            TrainOutcome::Unsaved { report, error } => Self {
                persisted: false,
                artifact_path: None,
                save_error: Some(error.to_string()),
                report,
            },
        }
    }
}

async fn train(State(state): State<Arc<AppState>>) -> Result<Json<TrainResponse>, ApiError> {
    let outcome = state.call(|engine| engine.train()).await?;
    info!(
        persisted = outcome.is_persisted(),
        accuracy = outcome.report().accuracy,
        "Training request completed"
    );
    Ok(Json(outcome.into()))
}

#[derive(Debug, Serialize)]
pub struct ModelResponse {
    #[serde(flatten)]
    pub summary: ModelSummary,
    pub low_importance_features: Vec<Feature>,
    pub accuracy_below_target: bool,
}

async fn model(State(state): State<Arc<AppState>>) -> Result<Json<ModelResponse>, ApiError> {
    let summary = state.call(|engine| engine.model_summary()).await?;
    Ok(Json(ModelResponse {
        low_importance_features: summary.low_importance_features(),
        accuracy_below_target: summary.accuracy_below_target(),
        summary,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TrendsParams {
    #[serde(default = "default_trend_days")]
    pub days: u32,
}

fn default_trend_days() -> u32 {
    7
}

async fn trends(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendsParams>,
) -> Result<Json<Option<TrendSummary>>, ApiError> {
    let summary = state
        .call(move |engine| engine.analyze_trends(params.days))
        .await?;
    Ok(Json(summary))
}

async fn sensitivity(
    State(state): State<Arc<AppState>>,
    Path(feature): Path<Feature>,
) -> Result<Json<Vec<SensitivityPoint>>, ApiError> {
    let points = state
        .call(move |engine| engine.sensitivity(feature, None))
        .await?;
    Ok(Json(points))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/schedule", get(default_schedule).post(profile_schedule))
        .route("/api/v1/train", post(train))
        .route("/api/v1/model", get(model))
        .route("/api/v1/trends", get(trends))
        .route("/api/v1/sensitivity/:feature", get(sensitivity))
        .with_state(state)
}

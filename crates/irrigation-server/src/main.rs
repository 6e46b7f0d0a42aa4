//! Irrigation server - pump decision engine behind an HTTP API
//!
//! Loads the stored model (training one on demand when configured),
//! then serves predictions, schedules, training and metrics.

use anyhow::{Context, Result};
use irrigation_core::{EngineError, IrrigationEngine};
use irrigation_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting irrigation-server");

    let config = ServerConfig::load()?;
    info!(
        source_url = %config.engine.source_url,
        artifact_path = %config.engine.artifact_path.display(),
        "Server configured"
    );

    // the blocking HTTP client must not be built on an async worker
    let engine_config = config.engine.clone();
    let engine = tokio::task::spawn_blocking(move || IrrigationEngine::from_config(engine_config))
        .await
        .context("Engine setup task failed")?
        .context("Failed to build irrigation engine")?;
    let logger = engine.logger().clone();
    let state = Arc::new(api::AppState::new(engine));

    warm_up(&state, config.train_on_startup).await;
    logger.log_startup(SERVER_VERSION, &config.listen_addr, state.is_ready());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Starting API server");

    axum::serve(listener, api::create_router(Arc::clone(&state)))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    logger.log_shutdown("SIGINT received");
    info!("Shutting down");
    Ok(())
}

/// Load the stored model; train one if none loads and `train_on_startup` is set
async fn warm_up(state: &api::AppState, train_on_startup: bool) {
    match state.call(|engine| engine.load_model().map(|_| ())).await {
        Ok(()) => return,
        Err(api::ApiError::Engine(EngineError::ModelNotReady(reason))) if train_on_startup => {
            info!(reason = %reason, "No usable model, training at startup");
        }
        Err(e) => {
            warn!(error = ?e, "Starting without a model; POST /api/v1/train to create one");
            return;
        }
    }

    match state.call(|engine| engine.train()).await {
        Ok(outcome) => info!(
            persisted = outcome.is_persisted(),
            accuracy = outcome.report().accuracy,
            "Startup training completed"
        ),
        Err(e) => warn!(error = ?e, "Startup training failed"),
    }
}

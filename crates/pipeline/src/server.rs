use crate::coordinator::RunCoordinator;
use crate::error::PipelineError;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::summary::RunSummary;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Local;
use registry::RegistryStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<RunCoordinator>,
    store: Arc<RegistryStore>,
    metrics: Arc<Metrics>,
    // held for the duration of a run; the registry has a single writer
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(coordinator: RunCoordinator, store: RegistryStore) -> Self {
        let metrics = coordinator.metrics();
        Self {
            coordinator: Arc::new(coordinator),
            store: Arc::new(store),
            metrics,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    collectors: Vec<String>,
}

#[derive(Serialize)]
struct RegistryStats {
    total_seen_all_time: usize,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match self {
            PipelineError::RunInProgress => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/runs", post(trigger_run))
        .route("/registry/stats", get(registry_stats))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        collectors: state
            .coordinator
            .collector_labels()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

async fn trigger_run(State(state): State<AppState>) -> Result<Json<RunSummary>, PipelineError> {
    let _guard = state
        .run_lock
        .try_lock()
        .map_err(|_| PipelineError::RunInProgress)?;

    let today = Local::now().date_naive();
    let summary = state
        .coordinator
        .run(&state.store, today)
        .await
        .inspect_err(|e| error!(error = %e, "Run failed"))?;

    Ok(Json(summary))
}

async fn registry_stats(State(state): State<AppState>) -> Json<RegistryStats> {
    let registry = state.store.load().await;
    Json(RegistryStats {
        total_seen_all_time: registry.len(),
    })
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

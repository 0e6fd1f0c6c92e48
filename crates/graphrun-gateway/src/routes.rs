use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{error, info};

use graphrun_engine::{ClearCacheRequest, RunIndividualRequest, RunOutcome, RunRequest};
use graphrun_nodes::NodeSchema;

use crate::protocol::{individual_response, ControlResponse};
use crate::sse::event_stream;
use crate::state::AppState;

// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.backend.status(),
    }))
}

// GET /nodes
pub async fn nodes(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let registry = state.backend.ready().await;
    let schemas = registry.schemas();
    let nodes: Vec<&NodeSchema> = schemas.iter().map(|s| s.as_ref()).collect();
    Json(serde_json::json!({
        "nodes": nodes,
        "categories": registry.categories(),
        "categoriesMissingNodes": [],
    }))
}

// POST /run
pub async fn run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> ControlResponse {
    // Detached so a dropped connection does not cancel the run halfway.
    let backend = state.backend.clone();
    let task = tokio::spawn(async move { backend.run(request).await });

    match task.await {
        Ok(Ok(RunOutcome::Completed)) => ControlResponse::success("Successfully ran nodes!"),
        Ok(Ok(RunOutcome::Aborted)) => ControlResponse::success("Execution was killed."),
        Ok(Err(e)) => ControlResponse::from_error("Error running nodes!", &e),
        Err(e) => {
            error!(error = %e, "Run task failed");
            ControlResponse::Error {
                message: "Error running nodes!".to_string(),
                exception: e.to_string(),
            }
        }
    }
}

// POST /run/individual
pub async fn run_individual(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunIndividualRequest>,
) -> Json<serde_json::Value> {
    let result = state.backend.run_individual(request).await.map(|_| ());
    if let Err(ref e) = result {
        error!(error = %e, "Individual run failed");
    }
    individual_response(result)
}

// POST /clear-cache/individual
pub async fn clear_cache_individual(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClearCacheRequest>,
) -> Json<serde_json::Value> {
    state.backend.clear_cache_individual(&request.id).await;
    individual_response(Ok(()))
}

// POST /pause
pub async fn pause(State(state): State<Arc<AppState>>) -> ControlResponse {
    match state.backend.pause().await {
        Ok(()) => ControlResponse::success("Successfully paused execution!"),
        Err(e) => ControlResponse::from_error("Error pausing execution!", &e),
    }
}

// POST /resume
pub async fn resume(State(state): State<Arc<AppState>>) -> ControlResponse {
    match state.backend.resume().await {
        Ok(()) => ControlResponse::success("Successfully resumed execution!"),
        Err(e) => ControlResponse::from_error("Error resuming execution!", &e),
    }
}

// POST /kill
pub async fn kill(State(state): State<Arc<AppState>>) -> ControlResponse {
    match state.backend.kill().await {
        Ok(()) => {
            info!("Execution killed");
            ControlResponse::success("Successfully killed execution!")
        }
        Err(e) => ControlResponse::from_error("Error killing execution!", &e),
    }
}

// GET /sse
pub async fn sse(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    event_stream(state.backend.queue().subscribe(), state.shutdown.clone())
}

// GET /setup-sse
pub async fn setup_sse(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    event_stream(state.backend.setup_queue().subscribe(), state.shutdown.clone())
}

// src/api/handlers.rs

use crate::api::{types::*, ApiState};
use axum::extract::{Path, State};
use axum::Json;

/// GET /health — Liveness plus the root agent's name.
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        agent: state.supervisor.root_agent().to_string(),
    })
}

/// POST /run/:task_id — Run one message as a tracked task and return everything it said.
///
/// Runtime faults are reported inside `response`, never as an HTTP error.
pub async fn run_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
    Json(body): Json<RunRequest>,
) -> Json<RunResponse> {
    let description = body
        .description
        .clone()
        .unwrap_or_else(|| format!("REST task {task_id}"));

    let outcome = state
        .supervisor
        .run_one_shot(&task_id, &body.text, Some(&description))
        .await;

    Json(RunResponse {
        task_id,
        response: outcome.response,
        errors: outcome.report.errors,
    })
}

//! Execution slot endpoints
//!
//! Read-only view of the exclusion gate, a manual stale-slot sweep, and credential
//! preflight runs.

use crate::{api::AppState, runtime::RunOutcome};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Request body for a credential preflight
#[derive(Debug, Deserialize)]
pub struct PreflightRequest {
    /// Secret pins the workflow's nodes declare
    pub pins: Vec<String>,
}

pub fn create_execution_routes() -> Router<AppState> {
    Router::new()
        .route("/api/executions", get(list_executions))
        .route("/api/executions/sweep", post(sweep_executions))
        .route(
            "/api/executions/{workflow_id}/{user_id}/preflight",
            post(preflight_execution),
        )
}

/// List active execution slots, oldest first
///
/// GET /api/executions
async fn list_executions(State(state): State<AppState>) -> Json<Value> {
    let queue = state.coordinator.queue();
    let active = queue.list_active();

    Json(json!({
        "count": active.len(),
        "tracked_keys": queue.lock_count(),
        "active": active,
    }))
}

/// Remove slots older than the staleness threshold
///
/// POST /api/executions/sweep
async fn sweep_executions(State(state): State<AppState>) -> Json<Value> {
    let removed = state.coordinator.queue().sweep_stale();
    tracing::info!("🧹 Manual execution sweep removed {} stale slots", removed);

    Json(json!({ "removed": removed }))
}

/// Check that a workflow's secret pins resolve for a user
///
/// POST /api/executions/{workflow_id}/{user_id}/preflight
/// Body: { "pins": ["$secret.openai-prod", "$secret.pg.password"] }
///
/// Runs as a real execution: it holds the workflow's slot and a credential context for
/// the duration of the check, and answers 409 when the workflow is already running.
/// Secret values are never returned.
async fn preflight_execution(
    State(state): State<AppState>,
    Path((workflow_id, user_id)): Path<(String, String)>,
    Json(request): Json<PreflightRequest>,
) -> Result<Json<Value>, StatusCode> {
    let secrets = state.secrets.clone();

    let outcome = state
        .coordinator
        .run(&workflow_id, &user_id, |scope| async move {
            let mut checks = Vec::with_capacity(request.pins.len());
            for pin in &request.pins {
                match secrets.resolve(pin, &scope.context_id).await {
                    Ok(_) => checks.push(json!({ "pin": pin, "resolved": true })),
                    Err(e) => checks.push(json!({
                        "pin": pin,
                        "resolved": false,
                        "error": e.to_string(),
                    })),
                }
            }
            Ok((scope.execution_id, checks))
        })
        .await
        .map_err(|e| {
            tracing::error!("❌ Preflight for workflow {} failed: {}", workflow_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match outcome {
        RunOutcome::AlreadyRunning => Err(StatusCode::CONFLICT),
        RunOutcome::Completed((execution_id, checks)) => {
            let ready = checks.iter().all(|check| check["resolved"] == true);
            Ok(Json(json!({
                "workflow_id": workflow_id,
                "user_id": user_id,
                "execution_id": execution_id,
                "ready": ready,
                "pins": checks,
            })))
        }
    }
}

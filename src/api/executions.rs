/// Execution endpoints
///
/// Manual runs, run inspection and cancellation. A run always answers with
/// its `ExecutionResult`, failed steps included; only runs that could not be
/// carried out at all map to an error status.

use crate::{
    api::{api_error, engine_error, parse_optional_json, ApiError, AppState},
    history::{RunStore, StepStore, TriggerType},
    runtime::ExecutionResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Create execution routes
pub fn create_execution_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows/{id}/execute", post(execute_workflow))
        .route("/api/executions/{id}", get(get_execution))
        .route("/api/executions/{id}/cancel", post(cancel_execution))
}

/// Run a workflow on demand
///
/// POST /api/workflows/{id}/execute
/// Body: optional JSON trigger payload
/// The run is detached from the request, so a client disconnect does not stop it.
pub async fn execute_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    body: String,
) -> Result<Json<ExecutionResult>, ApiError> {
    let payload = parse_optional_json(&body)?;

    tracing::info!("▶️ Manual execution requested for workflow: {}", workflow_id);

    state
        .engine
        .execute_detached(
            &workflow_id,
            TriggerType::Manual,
            payload.unwrap_or_else(|| Value::Object(Map::new())),
        )
        .await
        .map(Json)
        .map_err(engine_error)
}

/// Run record plus its step records
///
/// GET /api/executions/{id}
/// Returns: { "execution": {...}, "steps": [...] }
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let execution = state
        .history
        .get_run(execution_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("execution '{}' not found", execution_id)))?;

    let steps = state
        .history
        .list_step_records(execution_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(json!({ "execution": execution, "steps": steps })))
}

/// Ask an in-flight run to stop before its next step
///
/// POST /api/executions/{id}/cancel
/// 202 when the request was delivered, 409 when the run already finished.
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if state.engine.cancel(execution_id) {
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "executionId": execution_id, "cancelled": true })),
        ));
    }

    match state.history.get_run(execution_id).await {
        Ok(Some(run)) => Err(api_error(
            StatusCode::CONFLICT,
            format!("execution '{}' is already {}", execution_id, run.status),
        )),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("execution '{}' not found", execution_id),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

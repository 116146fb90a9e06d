/// Workflow management REST API endpoints
///
/// Provides CRUD operations for workflow definitions. Every definition is
/// validated as a graph before it is stored, so the engine never loads one
/// with duplicate ids, dangling edges or cycles from this surface.

use crate::{
    api::{api_error, ApiError, AppState},
    workflow::{storage::WorkflowMetadata, WorkflowDefinition, WorkflowGraph},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
}

/// Request body for workflow creation and update
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub workflow: WorkflowDefinition,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route(
            "/api/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
}

/// Reject definitions the engine would refuse to run
fn validate(workflow: &WorkflowDefinition) -> Result<(), ApiError> {
    if workflow.id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "workflow id must not be empty"));
    }
    WorkflowGraph::from_definition(workflow).validate().map_err(|e| {
        tracing::warn!("❌ Rejected workflow '{}': {}", workflow.id, e);
        api_error(StatusCode::UNPROCESSABLE_ENTITY, e)
    })
}

fn storage_error(context: &str, err: anyhow::Error) -> ApiError {
    tracing::error!("Failed to {}: {}", context, err);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, err)
}

/// Create a new workflow
///
/// POST /api/workflows
/// Body: { "workflow": { "id": "...", "name": "...", "steps": [...], "edges": [...] } }
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowResponse>), ApiError> {
    let workflow = payload.workflow;
    validate(&workflow)?;

    match state.storage.get_workflow(&workflow.id).await {
        Ok(Some(_)) => {
            return Err(api_error(
                StatusCode::CONFLICT,
                format!("workflow '{}' already exists", workflow.id),
            ))
        }
        Ok(None) => {}
        Err(e) => return Err(storage_error("check workflow", e)),
    }

    state
        .storage
        .save_workflow(&workflow)
        .await
        .map_err(|e| storage_error("save workflow", e))?;

    tracing::info!("🔥 Created workflow: {} ({})", workflow.id, workflow.name);

    Ok((
        StatusCode::CREATED,
        Json(WorkflowResponse {
            id: workflow.id.clone(),
            message: format!("Workflow '{}' created successfully", workflow.name),
        }),
    ))
}

/// List all workflows
///
/// GET /api/workflows
/// Returns: { "workflows": [{ "id": "...", "name": "...", "executionCount": 0, ... }] }
pub async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let workflows: Vec<WorkflowMetadata> = state
        .storage
        .list_workflows()
        .await
        .map_err(|e| storage_error("list workflows", e))?;
    Ok(Json(json!({ "workflows": workflows })))
}

/// Get a specific workflow by ID
///
/// GET /api/workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    match state.storage.get_workflow(&id).await {
        Ok(Some(workflow)) => Ok(Json(workflow)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, format!("workflow '{}' not found", id))),
        Err(e) => Err(storage_error("get workflow", e)),
    }
}

/// Replace an existing workflow
///
/// PUT /api/workflows/{id}
/// Body: same as create; the id in the URL wins.
pub async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let mut workflow = payload.workflow;
    workflow.id = id.clone();
    validate(&workflow)?;

    match state.storage.get_workflow(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(api_error(StatusCode::NOT_FOUND, format!("workflow '{}' not found", id))),
        Err(e) => return Err(storage_error("check workflow", e)),
    }

    state
        .storage
        .save_workflow(&workflow)
        .await
        .map_err(|e| storage_error("update workflow", e))?;

    tracing::info!("🔥 Updated workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' updated successfully", workflow.name),
    }))
}

/// Delete a workflow
///
/// DELETE /api/workflows/{id}
/// Run history is kept.
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.storage.delete_workflow(&id).await {
        Ok(true) => {
            tracing::info!("🗑️ Deleted workflow: {}", id);
            Ok(Json(json!({ "message": "Workflow deleted successfully" })))
        }
        Ok(false) => Err(api_error(StatusCode::NOT_FOUND, format!("workflow '{}' not found", id))),
        Err(e) => Err(storage_error("delete workflow", e)),
    }
}

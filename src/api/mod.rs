/// HTTP API Layer
///
/// This module provides the REST API endpoints around the engine:
/// - Workflow definition CRUD, validated on save
/// - Manual execution, run inspection and cancellation
/// - Webhook triggers

// Workflow management endpoints (POST/GET/PUT/DELETE)
pub mod workflows;

// Manual execution, run inspection and cancellation
pub mod executions;

// Webhook trigger endpoint
pub mod webhooks;

// Re-export router builders
pub use executions::create_execution_routes;
pub use webhooks::create_webhook_routes;
pub use workflows::create_workflow_routes;

use crate::{history::HistoryStore, runtime::EngineError, runtime::ExecutionEngine, workflow::WorkflowStorage};
use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Definition persistence
    pub storage: WorkflowStorage,
    /// Run and step records
    pub history: Arc<dyn HistoryStore>,
    /// Engine that runs workflows
    pub engine: Arc<ExecutionEngine>,
}

/// Error response: status code plus `{ "error": message }`
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

/// Map an engine failure to the status a caller should see
pub fn engine_error(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::WorkflowNotFound(_)) => api_error(StatusCode::NOT_FOUND, &err),
        Some(EngineError::InvalidDefinition(_)) => api_error(StatusCode::UNPROCESSABLE_ENTITY, &err),
        None => {
            tracing::error!("❌ Execution failed: {}", err);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, &err)
        }
    }
}

/// Parse an optional JSON request body; an empty body is `None`
pub fn parse_optional_json(body: &str) -> Result<Option<Value>, ApiError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid JSON body: {}", e)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::AppState;
    use crate::{
        database,
        history::SqliteHistoryStore,
        runtime::{
            ExecutionEngine, GatewayError, GatewayRequest, GatewayResponse, OutboundGateway, StepExecutor,
        },
        workflow::WorkflowStorage,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::{collections::BTreeMap, sync::Arc, time::Duration};

    /// Answers every request with 200 `{ "ok": true }`
    pub struct OkGateway;

    #[async_trait]
    impl OutboundGateway for OkGateway {
        async fn request(&self, _request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
            Ok(GatewayResponse {
                status: 200,
                headers: BTreeMap::new(),
                data: json!({ "ok": true }),
            })
        }
    }

    /// Full application state over an in-memory database
    pub async fn state() -> AppState {
        let pool = database::memory_pool().await.unwrap();
        database::init_schema(&pool).await.unwrap();

        let storage = WorkflowStorage::new(pool.clone());
        let history = Arc::new(SqliteHistoryStore::new(pool));
        let executor = StepExecutor::new(Arc::new(OkGateway), Duration::from_millis(1));
        let engine = Arc::new(ExecutionEngine::new(Arc::new(storage.clone()), history.clone(), executor));

        AppState {
            storage,
            history,
            engine,
        }
    }
}

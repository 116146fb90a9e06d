/// Webhook trigger endpoint
///
/// An inbound request to `/webhook/{workflow_id}` starts a run with the JSON
/// body as trigger payload. Authentication belongs to whatever sits in front
/// of this service.

use crate::{
    api::{engine_error, parse_optional_json, ApiError, AppState},
    history::TriggerType,
    runtime::ExecutionResult,
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{Map, Value};

/// Create webhook routes
pub fn create_webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook/{workflow_id}", post(execute_webhook))
}

/// Execute a workflow via webhook trigger
///
/// POST /webhook/{workflow_id}
/// Body: JSON payload exposed to steps as `trigger.*`
pub async fn execute_webhook(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    body: String,
) -> Result<Json<ExecutionResult>, ApiError> {
    tracing::info!("📥 Webhook request received for workflow: {}", workflow_id);

    let payload = parse_optional_json(&body)
        .map_err(|e| {
            tracing::warn!("❌ Invalid JSON payload for webhook: {}", workflow_id);
            e
        })?
        .unwrap_or_else(|| Value::Object(Map::new()));

    let started = std::time::Instant::now();
    let result = state
        .engine
        .execute_detached(&workflow_id, TriggerType::Webhook, payload)
        .await
        .map_err(engine_error)?;

    tracing::info!(
        "🎉 Webhook run {} of '{}' finished as {} in {:?}",
        result.execution_id,
        workflow_id,
        result.status,
        started.elapsed()
    );

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support;
    use crate::history::{RunStatus, RunStore};
    use crate::workflow::{Edge, Step, StepKind, WorkflowDefinition};
    use axum::http::StatusCode;
    use serde_json::json;

    async fn state_with_workflow() -> AppState {
        let state = test_support::state().await;
        let workflow = WorkflowDefinition::new(
            "hooked",
            vec![
                Step::new("hook", StepKind::WebhookTrigger),
                Step::new("shape", StepKind::Transform).with_config("expression", json!("{ order = input.hook.orderId }")),
            ],
            vec![Edge::new("hook", "shape")],
        );
        state.storage.save_workflow(&workflow).await.unwrap();
        state
    }

    #[tokio::test]
    async fn webhook_payload_becomes_trigger() {
        let state = state_with_workflow().await;

        let Json(result) = execute_webhook(
            State(state.clone()),
            Path("hooked".to_string()),
            r#"{ "orderId": 42 }"#.to_string(),
        )
        .await
        .unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.steps[0].output, json!({ "orderId": 42 }));
        assert_eq!(result.steps[1].output, json!({ "order": 42 }));

        let run = state.history.get_run(result.execution_id).await.unwrap().unwrap();
        assert_eq!(run.trigger_type, TriggerType::Webhook);
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let state = state_with_workflow().await;
        let (status, _) = execute_webhook(State(state), Path("hooked".to_string()), "not json".to_string())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let state = state_with_workflow().await;
        let (status, _) = execute_webhook(State(state), Path("nope".to_string()), "{}".to_string())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

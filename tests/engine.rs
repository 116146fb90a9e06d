//! End-to-end engine behavior against in-memory stores and a stub gateway

use async_trait::async_trait;
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use stepflow::{
    history::{MemoryHistoryStore, StepStore},
    runtime::{
        resolver, ExecutionContext, ExecutionEngine, GatewayError, GatewayRequest, GatewayResponse,
        OutboundGateway, StepExecutor,
    },
    workflow::WorkflowRegistry,
    Edge, RunStatus, Step, StepKind, StepStatus, TriggerType, WorkflowDefinition,
};
use uuid::Uuid;

/// Fixed responses by URL substring; anything containing "down" fails in transit
struct StubGateway {
    status: u16,
    data: Value,
}

#[async_trait]
impl OutboundGateway for StubGateway {
    async fn request(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        if request.url.contains("down") {
            return Err(GatewayError::Transport(format!("connection refused: {}", request.url)));
        }
        Ok(GatewayResponse {
            status: self.status,
            headers: BTreeMap::new(),
            data: self.data.clone(),
        })
    }
}

struct Setup {
    engine: ExecutionEngine,
    history: Arc<MemoryHistoryStore>,
}

fn setup_with(definition: WorkflowDefinition, status: u16, data: Value) -> Setup {
    let registry = Arc::new(WorkflowRegistry::new());
    registry.insert(definition);
    let history = Arc::new(MemoryHistoryStore::new());
    let executor = StepExecutor::new(Arc::new(StubGateway { status, data }), Duration::from_millis(1));
    Setup {
        engine: ExecutionEngine::new(registry, history.clone(), executor),
        history,
    }
}

fn setup(definition: WorkflowDefinition) -> Setup {
    setup_with(definition, 200, json!({ "ok": true }))
}

fn api(id: &str, endpoint: &str) -> Step {
    Step::new(id, StepKind::ApiCall).with_config("endpoint", json!(endpoint))
}

fn executed_ids(steps: &[stepflow::runtime::StepResult]) -> Vec<&str> {
    steps.iter().map(|s| s.step_id.as_str()).collect()
}

/// trigger(T) -> api_call(A) -> condition(C) -> delay(D)
fn scenario() -> WorkflowDefinition {
    WorkflowDefinition::new(
        "scenario",
        vec![
            Step::new("T", StepKind::WebhookTrigger),
            api("A", "/status"),
            Step::new("C", StepKind::Condition).with_config("expression", json!("input.A.data.ok == true")),
            Step::new("D", StepKind::Delay).with_config("delayMs", json!(1)),
        ],
        vec![Edge::new("T", "A"), Edge::new("A", "C"), Edge::new("C", "D")],
    )
}

#[tokio::test]
async fn scenario_runs_all_four_steps_in_order() {
    let s = setup(scenario());

    let result = s
        .engine
        .execute_with_trigger("scenario", TriggerType::Webhook, json!({}))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(executed_ids(&result.steps), vec!["T", "A", "C", "D"]);
    assert!(result.steps.iter().all(|s| s.status == StepStatus::Completed));
    assert_eq!(result.steps[1].output["data"], json!({ "ok": true }));
    assert_eq!(result.steps[2].output["conditionMet"], json!(true));
    assert_eq!(result.steps[3].output, json!({ "delayed": 1 }));
}

#[tokio::test]
async fn control_flow_is_deterministic() {
    let definition = WorkflowDefinition::new(
        "wf",
        vec![
            Step::new("join", StepKind::Transform),
            api("left", "/left"),
            Step::new("t", StepKind::WebhookTrigger),
            api("right", "/right"),
        ],
        vec![
            Edge::new("t", "left"),
            Edge::new("t", "right"),
            Edge::new("left", "join"),
            Edge::new("right", "join"),
        ],
    );
    let first = setup(definition.clone());
    let second = setup(definition);

    let a = first.engine.execute("wf", None).await.unwrap();
    let b = second.engine.execute("wf", None).await.unwrap();

    let kinds = |r: &stepflow::ExecutionResult| r.steps.iter().map(|s| (s.step_id.clone(), s.kind)).collect::<Vec<_>>();
    assert_eq!(kinds(&a), kinds(&b));
}

#[tokio::test]
async fn every_edge_source_is_recorded_before_its_target() {
    let definition = WorkflowDefinition::new(
        "wf",
        vec![
            Step::new("tail", StepKind::Delay).with_config("delayMs", json!(0)),
            Step::new("join", StepKind::Transform),
            api("b", "/b"),
            api("a", "/a"),
            Step::new("t", StepKind::ScheduleTrigger),
        ],
        vec![
            Edge::new("t", "a"),
            Edge::new("t", "b"),
            Edge::new("a", "join"),
            Edge::new("b", "join"),
            Edge::new("join", "tail"),
        ],
    );
    let edges = definition.edges.clone();
    let s = setup(definition);

    let result = s.engine.execute("wf", None).await.unwrap();
    let records = s.history.list_step_records(result.execution_id).await.unwrap();
    let position = |id: &str| records.iter().position(|r| r.step_id == id).unwrap();

    for edge in &edges {
        assert!(position(&edge.source) < position(&edge.target), "{} before {}", edge.source, edge.target);
    }
}

#[tokio::test]
async fn all_successful_steps_get_one_record_each() {
    let s = setup(scenario());
    let result = s.engine.execute("scenario", None).await.unwrap();

    let records = s.history.list_step_records(result.execution_id).await.unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.status == StepStatus::Completed));
}

#[tokio::test]
async fn unhandled_failure_halts_the_run() {
    let definition = WorkflowDefinition::new(
        "wf",
        vec![api("A", "/down"), api("B", "/b"), api("C", "/c")],
        vec![Edge::new("A", "B"), Edge::new("B", "C")],
    );
    let s = setup(definition);

    let result = s.engine.execute("wf", None).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(executed_ids(&result.steps), vec!["A"]);
    let records = s.history.list_step_records(result.execution_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, StepStatus::Failed);
    assert!(records[0].error.as_deref().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn handled_failure_continues_through_the_order() {
    let definition = WorkflowDefinition::new(
        "wf",
        vec![
            api("A", "/down"),
            Step::new("H", StepKind::ErrorHandler),
            api("B", "/b"),
        ],
        vec![Edge::new("A", "H"), Edge::new("A", "B")],
    );
    let s = setup(definition);

    let result = s.engine.execute("wf", None).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(executed_ids(&result.steps), vec!["A", "H", "B"]);
    assert_eq!(result.steps[1].status, StepStatus::Completed);
    assert_eq!(result.steps[2].status, StepStatus::Completed);
    assert_eq!(result.steps[1].output["errors"][0]["stepId"], json!("A"));
}

#[tokio::test]
async fn template_resolution_round_trip() {
    let ctx = ExecutionContext::new("wf", Uuid::new_v4(), TriggerType::Manual, json!({ "userId": "u1" }));

    assert_eq!(resolver::resolve(&json!("{{trigger.userId}}"), &ctx), json!("u1"));
    assert_eq!(resolver::resolve(&json!("prefix-{{trigger.userId}}"), &ctx), json!("prefix-u1"));
    assert_eq!(resolver::resolve(&json!("{{missing.path}}"), &ctx), json!("{{missing.path}}"));
}

#[tokio::test]
async fn delay_duration_is_at_least_the_configured_time() {
    let definition = WorkflowDefinition::new(
        "wf",
        vec![Step::new("D", StepKind::Delay).with_config("delayMs", json!(50))],
        vec![],
    );
    let s = setup(definition);

    let result = s.engine.execute("wf", None).await.unwrap();
    assert!(result.steps[0].duration >= Duration::from_millis(50));

    let records = s.history.list_step_records(result.execution_id).await.unwrap();
    assert!(records[0].duration_ms.unwrap() >= 50);
}

#[tokio::test]
async fn http_error_status_completes_the_step() {
    let definition = WorkflowDefinition::new("wf", vec![api("A", "/boom")], vec![]);
    let s = setup_with(definition, 500, json!({ "error": "internal" }));

    let result = s.engine.execute("wf", None).await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.steps[0].status, StepStatus::Completed);
    assert_eq!(result.steps[0].output["status"], json!(500));
}

#[tokio::test]
async fn condition_can_route_on_http_status() {
    let definition = WorkflowDefinition::new(
        "wf",
        vec![
            api("A", "/boom"),
            Step::new("C", StepKind::Condition).with_config("expression", json!("input.A.status >= 500")),
            api("alert", "/alert"),
            api("happy", "/happy"),
        ],
        vec![
            Edge::new("A", "C"),
            Edge::branch("C", "true", "alert"),
            Edge::branch("C", "false", "happy"),
        ],
    );
    let s = setup_with(definition, 503, Value::Null);

    let result = s.engine.execute("wf", None).await.unwrap();
    let statuses: Vec<StepStatus> = result.steps.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Completed, StepStatus::Completed, StepStatus::Completed, StepStatus::Skipped]
    );
    assert_eq!(result.steps[2].step_id, "alert");
}

#[tokio::test]
async fn concurrent_runs_do_not_block_each_other() {
    let definition = WorkflowDefinition::new(
        "wf",
        vec![Step::new("D", StepKind::Delay).with_config("delayMs", json!(200))],
        vec![],
    );
    let s = setup(definition);

    let started = std::time::Instant::now();
    let (a, b, c) = tokio::join!(
        s.engine.execute("wf", None),
        s.engine.execute("wf", None),
        s.engine.execute("wf", None),
    );
    assert!(started.elapsed() < Duration::from_millis(550));

    let ids = [a.unwrap().execution_id, b.unwrap().execution_id, c.unwrap().execution_id];
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    for id in ids {
        assert_eq!(s.history.list_step_records(id).await.unwrap().len(), 1);
    }
}

/// Core workflow type definitions
///
/// Defines the blueprint the engine runs: steps, their kinds and the edges
/// between them. Definitions are stored as JSON and only read per run.
/// Step configuration stays an untyped map on the graph; each executor parses
/// its own typed view of it at execution time.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// A complete workflow definition containing steps and their connections
///
/// Immutable for the duration of a run. The execution counter and
/// last-executed timestamp are maintained by the definition store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Unique workflow identifier (e.g., "wf-onboarding")
    pub id: String,
    /// Human-readable workflow name
    #[serde(default)]
    pub name: String,
    /// Steps in authoring order; this order is the scheduler's tie-break
    pub steps: Vec<Step>,
    /// Directed edges between steps
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Number of runs started against this definition
    #[serde(default)]
    pub execution_count: u64,
    /// When the last run finished
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, steps: Vec<Step>, edges: Vec<Edge>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            steps,
            edges,
            execution_count: 0,
            last_executed_at: None,
        }
    }

    /// Look up a step by id
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

/// A single step in the workflow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique step identifier within the workflow (e.g., "fetch-user")
    pub id: String,
    /// The kind of step which determines execution behavior
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Kind-specific configuration, validated lazily by the executor
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Layout position for the authoring UI; ignored by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: Map::new(),
            position: None,
        }
    }

    /// Builder-style config setter, mostly for tests and fixtures
    pub fn with_config(mut self, key: &str, value: Value) -> Self {
        self.config.insert(key.to_string(), value);
        self
    }

    /// Parse this step's raw config map into the executor's typed view
    pub fn parse_config<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.config.clone()))
    }
}

/// Available step kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Outbound request through the gateway
    /// Expected config: { "apiId": "crm", "endpoint": "/users", "method": "POST", "headers": {...}, "body": {...} }
    ApiCall,
    /// Derive a value from prior outputs
    /// Expected config: { "expression": "input.fetch.data.total * 2" } (optional)
    Transform,
    /// Boolean branch point; outgoing edges tagged "true"/"false"
    /// Expected config: { "expression": "input.fetch.status == 200" } (optional)
    Condition,
    /// Suspend the run for a while
    /// Expected config: { "delayMs": 1500 } (optional)
    Delay,
    /// Entry point for inbound webhook runs
    WebhookTrigger,
    /// Entry point for scheduled runs
    ScheduleTrigger,
    /// Lets a run continue past a failure of any step that links to it
    ErrorHandler,
}

impl StepKind {
    pub fn is_trigger(self) -> bool {
        matches!(self, StepKind::WebhookTrigger | StepKind::ScheduleTrigger)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::ApiCall => "api_call",
            StepKind::Transform => "transform",
            StepKind::Condition => "condition",
            StepKind::Delay => "delay",
            StepKind::WebhookTrigger => "webhook_trigger",
            StepKind::ScheduleTrigger => "schedule_trigger",
            StepKind::ErrorHandler => "error_handler",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas coordinates carried through for the authoring UI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Directed link between two steps
///
/// Handles name the branch an edge belongs to when a step has several
/// outgoing paths, e.g. a condition's "true" and "false" sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Source step ID
    pub source: String,
    /// Target step ID
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Edge leaving a branch handle, e.g. `Edge::branch("check", "true", "notify")`
    pub fn branch(source: impl Into<String>, handle: &str, target: impl Into<String>) -> Self {
        Self {
            source_handle: Some(handle.to_string()),
            ..Self::new(source, target)
        }
    }
}

/// Typed config of an `api_call` step
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallConfig {
    #[serde(default)]
    pub api_id: Option<String>,
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Typed config of `transform` and `condition` steps
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpressionConfig {
    #[serde(default)]
    pub expression: Option<String>,
}

/// Typed config of a `delay` step
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayConfig {
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definition_deserializes_from_authoring_json() {
        let definition: WorkflowDefinition = serde_json::from_value(json!({
            "id": "wf-1",
            "name": "Onboarding",
            "steps": [
                { "id": "t", "type": "webhook_trigger", "position": { "x": 0.0, "y": 10.0 } },
                { "id": "a", "type": "api_call", "config": { "apiId": "crm", "endpoint": "/users" } }
            ],
            "edges": [ { "source": "t", "target": "a", "sourceHandle": "out" } ]
        }))
        .unwrap();

        assert_eq!(definition.steps.len(), 2);
        assert_eq!(definition.steps[0].kind, StepKind::WebhookTrigger);
        assert_eq!(definition.edges[0].source_handle.as_deref(), Some("out"));
        assert_eq!(definition.execution_count, 0);
    }

    #[test]
    fn api_call_config_fills_defaults() {
        let step = Step::new("a", StepKind::ApiCall).with_config("endpoint", json!("/ping"));
        let config: ApiCallConfig = step.parse_config().unwrap();
        assert_eq!(config.method, "GET");
        assert!(config.headers.is_empty());
        assert!(config.body.is_none());
    }

    #[test]
    fn malformed_delay_config_is_rejected() {
        let step = Step::new("d", StepKind::Delay).with_config("delayMs", json!("soon"));
        assert!(step.parse_config::<DelayConfig>().is_err());
    }
}

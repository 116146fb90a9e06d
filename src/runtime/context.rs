/// Run-scoped execution state
///
/// One `ExecutionContext` lives for exactly one call to `execute`. Step
/// results are append-only: the engine inserts each result once and
/// executors only ever see the context by shared reference.

use crate::history::{StepStatus, TriggerType};
use crate::workflow::StepKind;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one executed (or skipped) step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl StepResult {
    pub fn completed(step_id: &str, kind: StepKind, output: Value, duration: Duration) -> Self {
        Self {
            step_id: step_id.to_string(),
            kind,
            status: StepStatus::Completed,
            output,
            error: None,
            duration,
        }
    }

    pub fn failed(step_id: &str, kind: StepKind, error: String, duration: Duration) -> Self {
        Self {
            step_id: step_id.to_string(),
            kind,
            status: StepStatus::Failed,
            output: Value::Null,
            error: Some(error),
            duration,
        }
    }

    pub fn skipped(step_id: &str, kind: StepKind) -> Self {
        Self {
            step_id: step_id.to_string(),
            kind,
            status: StepStatus::Skipped,
            output: Value::Null,
            error: None,
            duration: Duration::ZERO,
        }
    }
}

/// Append-only association from step id to result, in insertion order
#[derive(Debug, Clone, Default)]
pub struct StepResults {
    ordered: Vec<StepResult>,
    index: HashMap<String, usize>,
}

impl StepResults {
    /// Insert a result; a second result for the same step is refused
    pub fn insert(&mut self, result: StepResult) -> bool {
        if self.index.contains_key(&result.step_id) {
            return false;
        }
        self.index.insert(result.step_id.clone(), self.ordered.len());
        self.ordered.push(result);
        true
    }

    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.index.get(step_id).map(|&i| &self.ordered[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepResult> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn any_failed(&self) -> bool {
        self.ordered.iter().any(|r| r.status == StepStatus::Failed)
    }

    pub fn into_vec(self) -> Vec<StepResult> {
        self.ordered
    }
}

/// Mutable state of one in-flight run
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub execution_id: Uuid,
    pub trigger_type: TriggerType,
    /// Opaque to the engine; exposed to templates as `trigger.*`
    pub trigger_payload: Value,
    results: StepResults,
    /// Free-form scratch bag; exposed to templates as `vars.*`
    pub variables: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(
        workflow_id: impl Into<String>,
        execution_id: Uuid,
        trigger_type: TriggerType,
        trigger_payload: Value,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let mut variables = Map::new();
        variables.insert("workflowId".to_string(), Value::String(workflow_id.clone()));
        variables.insert("executionId".to_string(), Value::String(execution_id.to_string()));
        variables.insert("triggerType".to_string(), Value::String(trigger_type.to_string()));
        variables.insert("startedAt".to_string(), Value::String(chrono::Utc::now().to_rfc3339()));

        Self {
            workflow_id,
            execution_id,
            trigger_type,
            trigger_payload,
            results: StepResults::default(),
            variables,
        }
    }

    pub fn results(&self) -> &StepResults {
        &self.results
    }

    /// Record a step's result. Only the engine calls this.
    pub fn record(&mut self, result: StepResult) -> bool {
        self.results.insert(result)
    }

    /// Output of a step that completed, if any
    pub fn completed_output(&self, step_id: &str) -> Option<&Value> {
        self.results
            .get(step_id)
            .filter(|r| r.status == StepStatus::Completed)
            .map(|r| &r.output)
    }

    /// Map of step id -> output for every completed step so far
    pub fn completed_outputs(&self) -> Map<String, Value> {
        self.results
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .map(|r| (r.step_id.clone(), r.output.clone()))
            .collect()
    }

    pub fn into_results(self) -> StepResults {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn results_are_insert_once() {
        let mut results = StepResults::default();
        assert!(results.insert(StepResult::completed("a", StepKind::Transform, json!(1), Duration::ZERO)));
        assert!(!results.insert(StepResult::completed("a", StepKind::Transform, json!(2), Duration::ZERO)));
        assert_eq!(results.get("a").unwrap().output, json!(1));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn only_completed_outputs_are_exposed() {
        let mut ctx = ExecutionContext::new("wf", Uuid::new_v4(), TriggerType::Manual, json!({}));
        ctx.record(StepResult::completed("ok", StepKind::Transform, json!({ "n": 1 }), Duration::ZERO));
        ctx.record(StepResult::failed("bad", StepKind::ApiCall, "boom".into(), Duration::ZERO));
        ctx.record(StepResult::skipped("off", StepKind::Delay));

        let outputs = ctx.completed_outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs["ok"], json!({ "n": 1 }));
        assert!(ctx.completed_output("bad").is_none());
        assert!(ctx.results().any_failed());
    }

    #[test]
    fn step_result_serializes_duration_in_millis() {
        let result = StepResult::completed("a", StepKind::Delay, json!(null), Duration::from_millis(1500));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["durationMs"], json!(1500));
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["kind"], json!("delay"));
        assert!(value.get("error").is_none());
    }
}

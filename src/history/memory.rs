/// In-process history store
///
/// Keeps run and step records in memory behind tokio RwLocks. Used when the
/// engine is embedded without a database and throughout the test suite.

use crate::history::{
    ExecutionRecord, RunStatus, RunStore, StepRecord, StepStatus, StepStore, TriggerType,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    runs: RwLock<HashMap<Uuid, ExecutionRecord>>,
    /// Step records in global creation order
    steps: RwLock<Vec<StepRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of step records across all executions
    pub async fn step_record_count(&self) -> usize {
        self.steps.read().await.len()
    }
}

#[async_trait]
impl RunStore for MemoryHistoryStore {
    async fn create_run(
        &self,
        workflow_id: &str,
        trigger_type: TriggerType,
        trigger_payload: &Value,
    ) -> Result<ExecutionRecord> {
        let record = ExecutionRecord {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.to_string(),
            trigger_type,
            trigger_payload: trigger_payload.clone(),
            status: RunStatus::Running,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        };
        self.runs.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn finalize_run(
        &self,
        execution_id: Uuid,
        status: RunStatus,
        duration_ms: u64,
        error: Option<&str>,
    ) -> Result<()> {
        let mut runs = self.runs.write().await;
        let record = runs
            .get_mut(&execution_id)
            .ok_or_else(|| anyhow::anyhow!("Execution not found: {}", execution_id))?;
        if record.status.is_terminal() {
            return Err(anyhow::anyhow!("Execution {} is already {}", execution_id, record.status));
        }
        record.status = status;
        record.error = error.map(str::to_string);
        record.finished_at = Some(Utc::now());
        record.duration_ms = Some(duration_ms);
        Ok(())
    }

    async fn get_run(&self, execution_id: Uuid) -> Result<Option<ExecutionRecord>> {
        Ok(self.runs.read().await.get(&execution_id).cloned())
    }
}

#[async_trait]
impl StepStore for MemoryHistoryStore {
    async fn create_step_record(
        &self,
        execution_id: Uuid,
        step_id: &str,
        input: &Value,
    ) -> Result<StepRecord> {
        let record = StepRecord {
            id: Uuid::new_v4(),
            execution_id,
            step_id: step_id.to_string(),
            status: StepStatus::Running,
            input: input.clone(),
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        };
        self.steps.write().await.push(record.clone());
        Ok(record)
    }

    async fn finalize_step_record(
        &self,
        record_id: Uuid,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
        duration_ms: u64,
    ) -> Result<()> {
        let mut steps = self.steps.write().await;
        let record = steps
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| anyhow::anyhow!("Step record not found: {}", record_id))?;
        if record.status != StepStatus::Running {
            return Err(anyhow::anyhow!("Step record {} is already {}", record_id, record.status));
        }
        record.status = status;
        record.output = output.cloned();
        record.error = error.map(str::to_string);
        record.finished_at = Some(Utc::now());
        record.duration_ms = Some(duration_ms);
        Ok(())
    }

    async fn list_step_records(&self, execution_id: Uuid) -> Result<Vec<StepRecord>> {
        Ok(self
            .steps
            .read()
            .await
            .iter()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn run_is_finalized_exactly_once() {
        let store = MemoryHistoryStore::new();
        let run = store.create_run("wf", TriggerType::Manual, &json!({})).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);

        store.finalize_run(run.id, RunStatus::Completed, 12, None).await.unwrap();
        assert!(store.finalize_run(run.id, RunStatus::Failed, 13, Some("late")).await.is_err());

        let stored = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.duration_ms, Some(12));
    }

    #[tokio::test]
    async fn step_records_are_scoped_to_their_execution() {
        let store = MemoryHistoryStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let a = store.create_step_record(first, "a", &json!({})).await.unwrap();
        store.create_step_record(second, "x", &json!({})).await.unwrap();
        store.create_step_record(first, "b", &json!({})).await.unwrap();
        store
            .finalize_step_record(a.id, StepStatus::Failed, None, Some("boom"), 3)
            .await
            .unwrap();

        let records = store.list_step_records(first).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(records[0].error.as_deref(), Some("boom"));
        assert_eq!(records[1].status, StepStatus::Running);
    }
}

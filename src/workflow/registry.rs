/// In-memory workflow registry using ArcSwap
///
/// Lock-free definition store: readers load the current map snapshot while
/// writers swap in a new one, so runs in flight keep the definition they
/// started with. Used for embedded engines and tests.

use crate::workflow::{types::WorkflowDefinition, DefinitionStore};
use anyhow::Result;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use std::{collections::HashMap, sync::Arc};

#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Key: workflow_id, Value: definition
    workflows: ArcSwap<HashMap<String, WorkflowDefinition>>,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Add or replace a definition
    pub fn insert(&self, workflow: WorkflowDefinition) {
        self.workflows.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(workflow.id.clone(), workflow.clone());
            next
        });
        tracing::debug!("Registered workflow: {}", workflow.id);
    }

    /// Snapshot read of one definition
    pub fn get(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        self.workflows.load().get(workflow_id).cloned()
    }
}

#[async_trait]
impl DefinitionStore for WorkflowRegistry {
    async fn get_definition(&self, workflow_id: &str) -> Result<Option<WorkflowDefinition>> {
        Ok(self.get(workflow_id))
    }

    async fn increment_execution_count(&self, workflow_id: &str) -> Result<()> {
        let mut found = false;
        self.workflows.rcu(|current| {
            let mut next = (**current).clone();
            found = match next.get_mut(workflow_id) {
                Some(workflow) => {
                    workflow.execution_count += 1;
                    workflow.last_executed_at = Some(Utc::now());
                    true
                }
                None => false,
            };
            next
        });

        if !found {
            return Err(anyhow::anyhow!("Workflow not found: {}", workflow_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increments_are_visible_to_later_reads() {
        let registry = WorkflowRegistry::new();
        registry.insert(WorkflowDefinition::new("wf", vec![], vec![]));

        let before = registry.get_definition("wf").await.unwrap().unwrap();
        registry.increment_execution_count("wf").await.unwrap();
        let after = registry.get_definition("wf").await.unwrap().unwrap();

        assert_eq!(before.execution_count, 0);
        assert_eq!(after.execution_count, 1);
        assert!(after.last_executed_at.is_some());
        assert!(registry.increment_execution_count("other").await.is_err());
    }
}

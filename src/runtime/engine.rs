/// Workflow execution engine
///
/// Drives one run from trigger to terminal state: persists the run record,
/// validates and orders the graph, executes steps one at a time, prunes
/// branches a condition did not select, halts on a failure nothing handles,
/// and finalizes the run whatever happened. Runs share nothing but the
/// stores, so many can be in flight at once.

use crate::{
    history::{ExecutionRecord, HistoryStore, RunStatus, RunStore, StepStatus, StepStore, TriggerType},
    runtime::{
        context::{ExecutionContext, StepResult, StepResults},
        error::EngineError,
        executor::StepExecutor,
        resolver, scheduler,
    },
    workflow::{DefinitionStore, Edge, Step, StepKind, WorkflowGraph},
};
use anyhow::Result;
use arc_swap::ArcSwap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};
use uuid::Uuid;

/// Summary of one run, returned to whoever triggered it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    /// Every step result produced, in execution order
    pub steps: Vec<StepResult>,
    /// First failure message of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sequential workflow execution engine
pub struct ExecutionEngine {
    definitions: Arc<dyn DefinitionStore>,
    history: Arc<dyn HistoryStore>,
    executor: StepExecutor,
    /// Key: execution_id of an in-flight run, Value: its cancel flag
    cancellations: ArcSwap<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl ExecutionEngine {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        history: Arc<dyn HistoryStore>,
        executor: StepExecutor,
    ) -> Self {
        Self {
            definitions,
            history,
            executor,
            cancellations: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Run a workflow on manual request
    pub async fn execute(&self, workflow_id: &str, trigger_payload: Option<Value>) -> Result<ExecutionResult> {
        let payload = trigger_payload.unwrap_or_else(|| Value::Object(Map::new()));
        self.execute_with_trigger(workflow_id, TriggerType::Manual, payload).await
    }

    /// Run a workflow for any trigger source
    ///
    /// Step failures are reported inside the returned `ExecutionResult`. An
    /// `Err` means the run could not be carried out at all (unknown or
    /// invalid definition, store failure); the run record is still marked
    /// `failed` on a best-effort basis before the error is returned.
    pub async fn execute_with_trigger(
        &self,
        workflow_id: &str,
        trigger_type: TriggerType,
        trigger_payload: Value,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let record = self
            .history
            .create_run(workflow_id, trigger_type, &trigger_payload)
            .await?;

        tracing::info!(
            "🚀 Starting execution {} of workflow '{}' ({} trigger)",
            record.id,
            workflow_id,
            trigger_type
        );
        tracing::debug!("📦 Trigger payload for {}: {}", record.id, trigger_payload);

        let mut guard = self.register(record.id, started);
        let outcome = self.run(&record, trigger_payload, &guard.flag, started).await;

        let outcome = match outcome {
            Ok(result) => Ok(result),
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::error!("💥 Execution {} of workflow '{}' aborted: {}", record.id, workflow_id, e);
                if let Err(mark_err) = self
                    .history
                    .finalize_run(record.id, RunStatus::Failed, duration_ms, Some(&e.to_string()))
                    .await
                {
                    tracing::warn!("⚠️ Failed to mark execution {} as failed: {}", record.id, mark_err);
                }
                Err(e)
            }
        };
        guard.finished = true;
        outcome
    }

    /// Run a workflow on its own task
    ///
    /// The run keeps going to a terminal state even if the caller stops
    /// waiting, e.g. when an HTTP client disconnects mid-request.
    pub async fn execute_detached(
        self: &Arc<Self>,
        workflow_id: &str,
        trigger_type: TriggerType,
        trigger_payload: Value,
    ) -> Result<ExecutionResult> {
        let engine = Arc::clone(self);
        let workflow_id = workflow_id.to_string();
        tokio::spawn(async move {
            engine
                .execute_with_trigger(&workflow_id, trigger_type, trigger_payload)
                .await
        })
        .await
        .map_err(|e| anyhow::anyhow!("execution task failed: {}", e))?
    }

    /// Request cancellation of an in-flight run
    ///
    /// Returns false when no run with that id is currently executing. The run
    /// stops before its next step and finalizes as `cancelled`.
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        match self.cancellations.load().get(&execution_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                tracing::info!("🛑 Cancellation requested for execution {}", execution_id);
                true
            }
            None => false,
        }
    }

    fn register(&self, execution_id: Uuid, started: Instant) -> RunGuard<'_> {
        let flag = Arc::new(AtomicBool::new(false));
        self.cancellations.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(execution_id, flag.clone());
            next
        });
        RunGuard {
            engine: self,
            execution_id,
            started,
            flag,
            finished: false,
        }
    }

    fn deregister(&self, execution_id: Uuid) {
        self.cancellations.rcu(|current| {
            let mut next = (**current).clone();
            next.remove(&execution_id);
            next
        });
    }

    async fn run(
        &self,
        record: &ExecutionRecord,
        trigger_payload: Value,
        cancelled: &AtomicBool,
        started: Instant,
    ) -> Result<ExecutionResult> {
        let workflow_id = record.workflow_id.as_str();
        let definition = self
            .definitions
            .get_definition(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let graph = WorkflowGraph::from_definition(&definition);
        graph.validate().map_err(EngineError::from)?;

        let order = scheduler::order(&definition.steps, &definition.edges);
        tracing::debug!(
            "📋 Execution order for {}: {:?}",
            record.id,
            order.iter().map(|s| s.id.as_str()).collect::<Vec<_>>()
        );

        let mut ctx = ExecutionContext::new(workflow_id, record.id, record.trigger_type, trigger_payload);
        let mut was_cancelled = false;

        for (position, step) in order.iter().enumerate() {
            if cancelled.load(Ordering::SeqCst) {
                tracing::warn!("🛑 Execution {} cancelled before step '{}'", record.id, step.id);
                was_cancelled = true;
                break;
            }

            if !should_run(&graph, step, ctx.results()) {
                tracing::info!("⏭️ Step '{}' skipped: no active incoming edge", step.id);
                let step_record = self
                    .history
                    .create_step_record(record.id, &step.id, &Value::Null)
                    .await?;
                self.history
                    .finalize_step_record(step_record.id, StepStatus::Skipped, None, None, 0)
                    .await?;
                ctx.record(StepResult::skipped(&step.id, step.kind));
                continue;
            }

            tracing::info!(
                "📍 Step {}/{}: executing '{}' (type: {})",
                position + 1,
                order.len(),
                step.id,
                step.kind
            );

            let input = resolver::resolve(&Value::Object(step.config.clone()), &ctx);
            tracing::debug!("🔧 Resolved input for '{}': {}", step.id, input);

            let step_record = self
                .history
                .create_step_record(record.id, &step.id, &input)
                .await?;
            let step_started = Instant::now();

            match self.executor.execute_step(step, &ctx).await {
                Ok(output) => {
                    let duration = step_started.elapsed();
                    self.history
                        .finalize_step_record(
                            step_record.id,
                            StepStatus::Completed,
                            Some(&output),
                            None,
                            duration.as_millis() as u64,
                        )
                        .await?;
                    tracing::info!("✅ Step '{}' completed in {:?}", step.id, duration);
                    ctx.record(StepResult::completed(&step.id, step.kind, output, duration));
                }
                Err(err) => {
                    let duration = step_started.elapsed();
                    let message = err.to_string();
                    self.history
                        .finalize_step_record(
                            step_record.id,
                            StepStatus::Failed,
                            None,
                            Some(&message),
                            duration.as_millis() as u64,
                        )
                        .await?;
                    tracing::error!("❌ Step '{}' failed after {:?}: {}", step.id, duration, message);
                    ctx.record(StepResult::failed(&step.id, step.kind, message, duration));

                    if !graph.has_error_handler_successor(&step.id) {
                        tracing::warn!("⏸️ No error handler after '{}', halting execution {}", step.id, record.id);
                        break;
                    }
                    tracing::info!("🩹 Failure of '{}' is handled, continuing", step.id);
                }
            }
        }

        let results = ctx.into_results();
        let error = first_error(&results);
        let status = if was_cancelled {
            RunStatus::Cancelled
        } else if results.any_failed() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        self.definitions.increment_execution_count(workflow_id).await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        self.history
            .finalize_run(record.id, status, duration_ms, error.as_deref())
            .await?;

        tracing::info!(
            "🎉 Execution {} of workflow '{}' finished as {} in {}ms ({} steps)",
            record.id,
            workflow_id,
            status,
            duration_ms,
            results.len()
        );

        Ok(ExecutionResult {
            execution_id: record.id,
            workflow_id: workflow_id.to_string(),
            status,
            duration_ms,
            steps: results.into_vec(),
            error,
        })
    }
}

/// Registration of one in-flight run
///
/// Dropping it removes the cancel flag. If the run never reached a terminal
/// state (its future was dropped mid-run) the record is finalized as
/// `cancelled` on a spawned task.
struct RunGuard<'a> {
    engine: &'a ExecutionEngine,
    execution_id: Uuid,
    started: Instant,
    flag: Arc<AtomicBool>,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.engine.deregister(self.execution_id);
        if self.finished {
            return;
        }

        let execution_id = self.execution_id;
        let duration_ms = self.started.elapsed().as_millis() as u64;
        tracing::warn!("🧹 Execution {} dropped before finishing, marking it cancelled", execution_id);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let history = Arc::clone(&self.engine.history);
        handle.spawn(async move {
            if let Err(e) = history
                .finalize_run(
                    execution_id,
                    RunStatus::Cancelled,
                    duration_ms,
                    Some("execution dropped before completion"),
                )
                .await
            {
                tracing::warn!("⚠️ Failed to finalize dropped execution {}: {}", execution_id, e);
            }
        });
    }
}

fn first_error(results: &StepResults) -> Option<String> {
    results.iter().find_map(|r| r.error.clone())
}

/// A step with no incoming edge always runs; otherwise one active edge is enough
fn should_run(graph: &WorkflowGraph<'_>, step: &Step, results: &StepResults) -> bool {
    let mut incoming = graph.incoming(&step.id).peekable();
    if incoming.peek().is_none() {
        return true;
    }
    incoming.any(|edge| edge_is_active(graph, edge, results))
}

/// Whether `edge` carries control flow given the results so far
fn edge_is_active(graph: &WorkflowGraph<'_>, edge: &Edge, results: &StepResults) -> bool {
    let Some(source) = results.get(&edge.source) else {
        return false;
    };
    if source.status == StepStatus::Skipped {
        return false;
    }

    let into_handler = graph
        .step(&edge.target)
        .is_some_and(|target| target.kind == StepKind::ErrorHandler);
    if into_handler {
        return source.status == StepStatus::Failed;
    }

    if source.kind == StepKind::Condition {
        let branch = match edge.source_handle.as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => return true,
        };
        if source.status != StepStatus::Completed {
            return false;
        }
        let condition_met = source
            .output
            .get("conditionMet")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        return condition_met == branch;
    }

    true
}

/// Run and step history
///
/// Append-only record of what each execution did. A run record is created in
/// `running` state and finalized exactly once; step records follow the same
/// lifecycle, one per step the engine touched. Every write is scoped to one
/// execution id, so concurrent runs never contend on each other's rows.

// Record and status types shared by every store implementation
pub mod types;

// SQLite-backed stores (sqlx)
pub mod sqlite;

// In-process stores for embedding and tests
pub mod memory;

pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;
pub use types::{ExecutionRecord, RunStatus, StepRecord, StepStatus, TriggerType};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Persistence of run-level records
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new run in `running` state
    async fn create_run(
        &self,
        workflow_id: &str,
        trigger_type: TriggerType,
        trigger_payload: &Value,
    ) -> Result<ExecutionRecord>;

    /// Move a run to its terminal state
    async fn finalize_run(
        &self,
        execution_id: Uuid,
        status: RunStatus,
        duration_ms: u64,
        error: Option<&str>,
    ) -> Result<()>;

    async fn get_run(&self, execution_id: Uuid) -> Result<Option<ExecutionRecord>>;
}

/// Persistence of per-step records
#[async_trait]
pub trait StepStore: Send + Sync {
    /// Insert a new step record in `running` state with its resolved input
    async fn create_step_record(
        &self,
        execution_id: Uuid,
        step_id: &str,
        input: &Value,
    ) -> Result<StepRecord>;

    /// Move a step record to its terminal state
    async fn finalize_step_record(
        &self,
        record_id: Uuid,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
        duration_ms: u64,
    ) -> Result<()>;

    /// Step records of one execution, in the order they were created
    async fn list_step_records(&self, execution_id: Uuid) -> Result<Vec<StepRecord>>;
}

/// Both halves of the history, as the engine consumes them
pub trait HistoryStore: RunStore + StepStore {}

impl<T: RunStore + StepStore> HistoryStore for T {}

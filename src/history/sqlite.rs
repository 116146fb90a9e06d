/// SQLite persistence for run and step history
///
/// Two tables: `workflow_executions` (one row per run) and `step_executions`
/// (one row per step the engine touched). JSON snapshots are stored as text,
/// timestamps as RFC 3339 strings.

use crate::history::{
    ExecutionRecord, RunStatus, RunStore, StepRecord, StepStatus, StepStore, TriggerType,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqlitePool, sqlite::SqliteRow, Row};
use uuid::Uuid;

/// sqlx-backed run and step store
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the history tables. Safe to call multiple times.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                trigger_type TEXT NOT NULL,
                trigger_payload TEXT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS step_executions (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                status TEXT NOT NULL,
                input TEXT NOT NULL,
                output TEXT,
                error TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_step_executions_execution
            ON step_executions(execution_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

fn parse_optional_timestamp(text: Option<String>) -> Result<Option<DateTime<Utc>>> {
    text.as_deref().map(parse_timestamp).transpose()
}

fn execution_from_row(row: &SqliteRow) -> Result<ExecutionRecord> {
    let id: String = row.try_get("id")?;
    let trigger_type: String = row.try_get("trigger_type")?;
    let trigger_payload: String = row.try_get("trigger_payload")?;
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let duration_ms: Option<i64> = row.try_get("duration_ms")?;

    Ok(ExecutionRecord {
        id: Uuid::parse_str(&id)?,
        workflow_id: row.try_get("workflow_id")?,
        trigger_type: trigger_type.parse()?,
        trigger_payload: serde_json::from_str(&trigger_payload)?,
        status: status.parse()?,
        error: row.try_get("error")?,
        started_at: parse_timestamp(&started_at)?,
        finished_at: parse_optional_timestamp(row.try_get("finished_at")?)?,
        duration_ms: duration_ms.map(|ms| ms.max(0) as u64),
    })
}

fn step_from_row(row: &SqliteRow) -> Result<StepRecord> {
    let id: String = row.try_get("id")?;
    let execution_id: String = row.try_get("execution_id")?;
    let status: String = row.try_get("status")?;
    let input: String = row.try_get("input")?;
    let output: Option<String> = row.try_get("output")?;
    let started_at: String = row.try_get("started_at")?;
    let duration_ms: Option<i64> = row.try_get("duration_ms")?;

    Ok(StepRecord {
        id: Uuid::parse_str(&id)?,
        execution_id: Uuid::parse_str(&execution_id)?,
        step_id: row.try_get("step_id")?,
        status: status.parse()?,
        input: serde_json::from_str(&input)?,
        output: output.as_deref().map(serde_json::from_str).transpose()?,
        error: row.try_get("error")?,
        started_at: parse_timestamp(&started_at)?,
        finished_at: parse_optional_timestamp(row.try_get("finished_at")?)?,
        duration_ms: duration_ms.map(|ms| ms.max(0) as u64),
    })
}

#[async_trait]
impl RunStore for SqliteHistoryStore {
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

        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, trigger_type, trigger_payload, status, started_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.workflow_id)
        .bind(trigger_type.as_str())
        .bind(serde_json::to_string(trigger_payload)?)
        .bind(RunStatus::Running.as_str())
        .bind(record.started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn finalize_run(
        &self,
        execution_id: Uuid,
        status: RunStatus,
        duration_ms: u64,
        error: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = ?, error = ?, finished_at = ?, duration_ms = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(duration_ms as i64)
        .bind(execution_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("Execution {} not found or already finalized", execution_id));
        }
        Ok(())
    }

    async fn get_run(&self, execution_id: Uuid) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(execution_from_row).transpose()
    }
}

#[async_trait]
impl StepStore for SqliteHistoryStore {
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

        sqlx::query(
            r#"
            INSERT INTO step_executions (id, execution_id, step_id, status, input, started_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(execution_id.to_string())
        .bind(step_id)
        .bind(StepStatus::Running.as_str())
        .bind(serde_json::to_string(input)?)
        .bind(record.started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

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
        let output_json = output.map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE step_executions
            SET status = ?, output = ?, error = ?, finished_at = ?, duration_ms = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(output_json)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(duration_ms as i64)
        .bind(record_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("Step record {} not found or already finalized", record_id));
        }
        Ok(())
    }

    async fn list_step_records(&self, execution_id: Uuid) -> Result<Vec<StepRecord>> {
        let rows = sqlx::query("SELECT * FROM step_executions WHERE execution_id = ? ORDER BY rowid")
            .bind(execution_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(step_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_pool;
    use serde_json::json;

    async fn store() -> SqliteHistoryStore {
        let store = SqliteHistoryStore::new(memory_pool().await.unwrap());
        store.init_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn run_lifecycle_is_persisted() {
        let store = store().await;
        let run = store
            .create_run("wf-1", TriggerType::Webhook, &json!({ "userId": "u1" }))
            .await
            .unwrap();

        let loaded = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.trigger_payload, json!({ "userId": "u1" }));

        store
            .finalize_run(run.id, RunStatus::Failed, 42, Some("step 'a' failed"))
            .await
            .unwrap();
        let loaded = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.duration_ms, Some(42));
        assert_eq!(loaded.error.as_deref(), Some("step 'a' failed"));
        assert!(loaded.finished_at.is_some());

        assert!(store.finalize_run(run.id, RunStatus::Completed, 1, None).await.is_err());
    }

    #[tokio::test]
    async fn step_records_keep_creation_order() {
        let store = store().await;
        let execution_id = Uuid::new_v4();

        let first = store
            .create_step_record(execution_id, "fetch", &json!({ "endpoint": "/users" }))
            .await
            .unwrap();
        let second = store.create_step_record(execution_id, "check", &json!({})).await.unwrap();
        store
            .finalize_step_record(first.id, StepStatus::Completed, Some(&json!({ "status": 200 })), None, 7)
            .await
            .unwrap();
        store
            .finalize_step_record(second.id, StepStatus::Skipped, None, None, 0)
            .await
            .unwrap();

        let records = store.list_step_records(execution_id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].step_id, "fetch");
        assert_eq!(records[0].output, Some(json!({ "status": 200 })));
        assert_eq!(records[0].input, json!({ "endpoint": "/users" }));
        assert_eq!(records[1].status, StepStatus::Skipped);
        assert!(store.get_run(Uuid::new_v4()).await.unwrap().is_none());
    }
}

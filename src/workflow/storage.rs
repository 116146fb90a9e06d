/// SQLite persistence layer for workflow definitions
///
/// Definitions are stored as JSON, with the execution counter and
/// last-executed timestamp kept in their own columns so a run can bump them
/// without rewriting the definition.

use crate::workflow::{types::WorkflowDefinition, DefinitionStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};

/// SQLite-based definition store
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    /// SQLite connection pool for the engine database
    pool: SqlitePool,
}

impl WorkflowStorage {
    /// Create new storage instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the workflow storage schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                definition TEXT NOT NULL,
                execution_count INTEGER NOT NULL DEFAULT 0,
                last_executed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_workflows_name
            ON workflows(name)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new definition or replace an existing one
    ///
    /// The execution counter survives updates; it belongs to the store, not
    /// to the authored definition.
    pub async fn save_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, definition, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&definition_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a definition by ID
    pub async fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        let row = sqlx::query(
            "SELECT definition, execution_count, last_executed_at FROM workflows WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.try_get("definition")?;
                let execution_count: i64 = row.try_get("execution_count")?;
                let last_executed_at: Option<String> = row.try_get("last_executed_at")?;

                let mut workflow: WorkflowDefinition = serde_json::from_str(&definition_json)?;
                workflow.execution_count = execution_count.max(0) as u64;
                workflow.last_executed_at = last_executed_at
                    .as_deref()
                    .map(|text| DateTime::parse_from_rfc3339(text).map(|t| t.with_timezone(&Utc)))
                    .transpose()?;
                Ok(Some(workflow))
            }
            None => Ok(None),
        }
    }

    /// List all workflows with basic metadata
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowMetadata>> {
        let rows = sqlx::query(
            "SELECT id, name, execution_count, last_executed_at, updated_at FROM workflows ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut workflows = Vec::new();
        for row in rows {
            let execution_count: i64 = row.try_get("execution_count")?;
            workflows.push(WorkflowMetadata {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                execution_count: execution_count.max(0) as u64,
                last_executed_at: row.try_get("last_executed_at")?,
                updated_at: row.try_get("updated_at")?,
            });
        }

        Ok(workflows)
    }

    /// Delete a workflow by ID
    pub async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DefinitionStore for WorkflowStorage {
    async fn get_definition(&self, workflow_id: &str) -> Result<Option<WorkflowDefinition>> {
        self.get_workflow(workflow_id).await
    }

    async fn increment_execution_count(&self, workflow_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET execution_count = execution_count + 1, last_executed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("Workflow not found: {}", workflow_id));
        }
        Ok(())
    }
}

/// Basic workflow metadata for listing operations
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    pub id: String,
    pub name: String,
    pub execution_count: u64,
    pub last_executed_at: Option<String>,
    pub updated_at: String,
}

/// SQLite connection setup
///
/// One database file holds workflow definitions and run history. The pool is
/// created lazily on first start and every table is bootstrapped with
/// `CREATE TABLE IF NOT EXISTS`, so startup is idempotent.

use crate::{config::DatabaseConfig, history::SqliteHistoryStore, workflow::storage::WorkflowStorage};
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Open (creating if missing) the engine database under the configured data dir
pub async fn open_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory '{}': {}", config.data_dir, e))?;
    let db_path = Path::new(&config.data_dir).join(&config.file_name);

    tracing::info!("🗄️ Opening database: {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;

    tracing::info!("✅ Database ready: {}", db_path.display());

    Ok(pool)
}

/// Single-connection in-memory database, for tests and throwaway engines
pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// Create every table the engine uses
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    WorkflowStorage::new(pool.clone()).init_schema().await?;
    SqliteHistoryStore::new(pool.clone()).init_schema().await?;
    Ok(())
}

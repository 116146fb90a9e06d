/// Server setup and initialization
///
/// Wires together all components: database, stores, gateway, execution engine,
/// and HTTP routes. Provides the main application factory function for creating
/// the Axum app.

use crate::{
    api::{create_execution_routes, create_webhook_routes, create_workflow_routes, AppState},
    config::Config,
    database,
    history::SqliteHistoryStore,
    runtime::{ExecutionEngine, HttpGateway, StepExecutor},
    workflow::WorkflowStorage,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;

/// Create the main Axum application with all routes
///
/// Opens the database, bootstraps its schema and builds the engine around the
/// SQLite stores and the reqwest gateway.
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("🗄️ Initializing database in {}", config.database.data_dir);
    let pool = database::open_pool(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;

    let storage = WorkflowStorage::new(pool.clone());
    let history = Arc::new(SqliteHistoryStore::new(pool));

    tracing::info!("🌍 Outbound gateway: {}", config.engine.gateway_url);
    let gateway = HttpGateway::new(
        config.engine.gateway_url.clone(),
        Duration::from_secs(config.engine.gateway_timeout_secs),
    )?;

    tracing::info!("🚀 Initializing execution engine");
    let executor = StepExecutor::new(
        Arc::new(gateway),
        Duration::from_millis(config.engine.default_delay_ms),
    )
    .with_expression_timeout(Duration::from_millis(config.engine.expression_timeout_ms));
    let engine = Arc::new(ExecutionEngine::new(
        Arc::new(storage.clone()),
        history.clone(),
        executor,
    ));

    let state = AppState {
        storage,
        history,
        engine,
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_execution_routes())
        .merge(create_webhook_routes())
        .with_state(state);

    tracing::info!("✅ Application initialized successfully");

    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    let level = config
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting stepflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn app_builds_against_a_fresh_data_dir() {
        let dir = std::env::temp_dir().join(format!("stepflow-test-{}", uuid::Uuid::new_v4()));
        let mut config = Config::default();
        config.database.data_dir = dir.to_string_lossy().into_owned();

        let _app = create_app(config).await.unwrap();
        assert!(dir.join("stepflow.db").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn health_check_says_ok() {
        assert_eq!(health_check().await, "ok");
    }
}

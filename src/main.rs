/// stepflow: declarative workflow execution engine
///
/// Main entry point for the stepflow server. Loads configuration from the
/// environment and serves:
/// - Workflow management API at /api/workflows/*
/// - Manual runs and run inspection at /api/workflows/{id}/execute, /api/executions/*
/// - Webhook triggers at /webhook/{workflow_id}
/// - Health check at /healthz

use stepflow::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}

/// stepflow: declarative workflow execution engine
///
/// This library runs directed graphs of typed steps (API calls, transforms,
/// conditions, delays, error handlers, triggers) to completion, one step at a
/// time, and records what every run and step did.

// Core configuration and setup
pub mod config;

// SQLite pool and schema bootstrap
pub mod database;

// Workflow definition layer - graph model, validation and definition stores
pub mod workflow;

// Run and step history - records, statuses and stores
pub mod history;

// Runtime execution engine - resolver, executors, scheduler and engine loop
pub mod runtime;

// HTTP API layer - definition CRUD, execution and webhook triggers
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use history::{RunStatus, StepStatus, TriggerType};
pub use runtime::{ExecutionEngine, ExecutionResult, StepExecutor};
pub use server::start_server;
pub use workflow::{Edge, Step, StepKind, WorkflowDefinition};

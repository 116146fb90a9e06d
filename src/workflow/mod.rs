/// Workflow Definition Layer
///
/// This module holds the graph model the engine executes and the stores it
/// is loaded from:
/// - Type definitions (WorkflowDefinition, Step, StepKind, Edge)
/// - Adjacency view and shape validation
/// - SQLite persistence with sqlx
/// - Lock-free in-memory registry using ArcSwap

// Core workflow type definitions
pub mod types;

// Dependency/successor queries and DAG validation
pub mod graph;

// SQLite persistence layer for definitions
pub mod storage;

// In-memory definition store using ArcSwap
pub mod registry;

// Re-export commonly used types
pub use graph::{GraphError, WorkflowGraph};
pub use registry::WorkflowRegistry;
pub use storage::WorkflowStorage;
pub use types::{Edge, Position, Step, StepKind, WorkflowDefinition};

use anyhow::Result;
use async_trait::async_trait;

/// Source of workflow definitions for the engine
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Load a definition, `None` when it does not exist
    async fn get_definition(&self, workflow_id: &str) -> Result<Option<WorkflowDefinition>>;

    /// Bump the execution counter and last-executed timestamp
    async fn increment_execution_count(&self, workflow_id: &str) -> Result<()>;
}

/// Runtime Execution Engine
///
/// Everything that happens while a workflow runs:
/// - Run-scoped context and append-only step results
/// - `{{...}}` template resolution against that context
/// - Sandboxed Lua expressions for transform and condition steps
/// - Outbound HTTP through the gateway collaborator
/// - Per-kind step executors
/// - Topological ordering and the sequential engine loop

// Run-scoped state passed to every executor
pub mod context;

// Engine and step error types
pub mod error;

// Variable resolver for step config templates
pub mod resolver;

// Lua sandbox for author-supplied expressions
pub mod expression;

// Outbound gateway contract and reqwest implementation
pub mod gateway;

// Individual step execution handlers
pub mod executor;

// Deterministic topological ordering
pub mod scheduler;

// Core execution engine state machine
pub mod engine;

// Re-export main types
pub use context::{ExecutionContext, StepResult};
pub use engine::{ExecutionEngine, ExecutionResult};
pub use error::{EngineError, ExecutionError};
pub use executor::{StepExecutor, DEFAULT_EXPRESSION_TIMEOUT};
pub use gateway::{GatewayError, GatewayRequest, GatewayResponse, HttpGateway, OutboundGateway};

/// Engine error types
///
/// `ExecutionError` is contained at the step boundary and becomes a failed
/// StepResult. `EngineError` aborts a run before any step can own it and is
/// returned to the caller.

use crate::runtime::gateway::GatewayError;
use crate::workflow::GraphError;
use thiserror::Error;

/// Why a single step could not produce an output
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid config for step '{step_id}': {message}")]
    InvalidConfig { step_id: String, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("decode failure: {0}")]
    Decode(String),

    #[error("expression evaluation failed: {0}")]
    Expression(String),
}

impl ExecutionError {
    pub fn invalid_config(step_id: &str, message: impl std::fmt::Display) -> Self {
        Self::InvalidConfig {
            step_id: step_id.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<GatewayError> for ExecutionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transport(message) => Self::Transport(message),
            GatewayError::Decode(message) => Self::Decode(message),
        }
    }
}

/// Why a run could not be carried out at all
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(#[from] GraphError),
}

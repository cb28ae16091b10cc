//! Error types for the state-graph engine.

use thiserror::Error;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised by graph construction, execution, and persistence.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("graph validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("state field '{0}' is not declared in the schema")]
    UnknownField(String),

    #[error("router at node '{node}' returned '{key}' which is not in its branch map")]
    RoutingMissing { node: String, key: String },

    #[error("node '{node}' failed: {error}")]
    NodeExecution { node: String, error: String },

    #[error("iteration budget of {budget} exceeded")]
    IterationBudgetExceeded { budget: u32 },

    #[error("workflow timed out")]
    Timeout,

    #[error("workflow cancelled")]
    Cancelled,

    #[error("no checkpoint found for workflow '{0}'")]
    CheckpointNotFound(String),

    #[error("checkpoint store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Create a store error.
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store(message.into())
    }
}

//! Tool layer: schemas, results, and the registry.
//!
//! Tools are external capabilities described by a [`ToolSchema`] and
//! invoked through the [`ToolRegistry`]. Execution is fail-safe: a tool
//! never raises to its caller, every failure is folded into a
//! [`ToolResult`] with `success == false`.

mod registry;
mod schema;

pub use registry::{RegistryError, RegistryResult, ToolRegistry};
pub use schema::{ParameterKind, ToolCategory, ToolParameter, ToolSchema};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Tagged result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    /// Successful result with a payload.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Failed result with an error message.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// An executable tool.
///
/// Implementations may return an error from `execute`; the registry folds
/// it into a failed [`ToolResult`] so callers never see a raised error.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Schema describing the tool to the model.
    fn schema(&self) -> &ToolSchema;

    /// Execute the tool with validated arguments.
    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<ToolResult>;

    /// Tool name, from the schema.
    fn name(&self) -> &str {
        &self.schema().name
    }

    /// Category, from the schema.
    fn category(&self) -> ToolCategory {
        self.schema().category
    }
}

//! Thread-safe tool registry.
//!
//! The registry is cheap to clone and safe to share across tasks; the
//! inner table is guarded by a read-write lock that is never held across
//! an await point.

use super::schema::ToolCategory;
use super::{Tool, ToolResult};
use futures_util::FutureExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by the registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("tool '{0}' already registered")]
    Duplicate(String),

    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("invalid tool name: '{0}'")]
    InvalidName(String),

    #[error("invalid tool schema: {0}")]
    InvalidSchema(String),
}

impl RegistryError {
    /// Create an invalid-schema error.
    pub fn invalid_schema<S: Into<String>>(message: S) -> Self {
        Self::InvalidSchema(message.into())
    }
}

#[derive(Default)]
struct RegistryInner {
    tools: HashMap<String, Arc<dyn Tool>>,
    by_category: HashMap<ToolCategory, Vec<String>>,
}

/// Central registry mapping tool names to schemas and executors.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_name(name: &str) -> RegistryResult<()> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Register a tool; duplicate names fail.
    pub fn register(&self, tool: Arc<dyn Tool>) -> RegistryResult<()> {
        let name = tool.name().to_string();
        Self::validate_name(&name)?;

        let mut inner = self.inner.write().unwrap();
        if inner.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        inner
            .by_category
            .entry(tool.category())
            .or_default()
            .push(name.clone());
        inner.tools.insert(name.clone(), tool);

        tracing::debug!(tool = %name, "tool registered");
        Ok(())
    }

    /// Remove a tool by name.
    pub fn unregister(&self, name: &str) -> RegistryResult<()> {
        let mut inner = self.inner.write().unwrap();
        let tool = inner
            .tools
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if let Some(names) = inner.by_category.get_mut(&tool.category()) {
            names.retain(|n| n != name);
        }
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.inner.read().unwrap().tools.get(name).cloned()
    }

    /// Whether a tool with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().unwrap().tools.contains_key(name)
    }

    /// List tool names, optionally filtered by category.
    pub fn list(&self, category: Option<ToolCategory>) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        match category {
            Some(cat) => inner.by_category.get(&cat).cloned().unwrap_or_default(),
            None => {
                let mut names: Vec<String> = inner.tools.keys().cloned().collect();
                names.sort();
                names
            }
        }
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate arguments against a tool's schema.
    ///
    /// Returns `(true, None)` when valid, `(false, Some(reason))` otherwise.
    pub fn validate(&self, name: &str, args: &Map<String, Value>) -> (bool, Option<String>) {
        match self.get(name) {
            Some(tool) => match tool.schema().validate_args(args) {
                None => (true, None),
                Some(err) => (false, Some(err)),
            },
            None => (false, Some(format!("tool '{}' not found", name))),
        }
    }

    /// Execute a tool by name.
    ///
    /// Arguments are validated first; invalid arguments produce a failed
    /// result without invoking the executor. Executor errors and panics are
    /// caught and folded into the result, never propagated.
    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> ToolResult {
        let tool = match self.get(name) {
            Some(tool) => tool,
            None => return ToolResult::fail(format!("tool '{}' not found", name)),
        };

        if let Some(err) = tool.schema().validate_args(&args) {
            tracing::debug!(tool = %name, error = %err, "tool arguments rejected");
            return ToolResult::fail(err);
        }

        tracing::debug!(tool = %name, "executing tool");

        match AssertUnwindSafe(tool.execute(args)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(tool = %name, error = %e, "tool execution failed");
                ToolResult::fail(format!("tool execution failed: {}", e))
            }
            Err(_) => {
                tracing::error!(tool = %name, "tool executor panicked");
                ToolResult::fail(format!("tool '{}' panicked during execution", name))
            }
        }
    }

    /// Emit function-calling schemas for all (or selected) tools.
    pub fn to_function_schemas(&self, names: Option<&[String]>) -> Vec<Value> {
        self.collect_schemas(names, |tool| tool.schema().to_function_schema())
    }

    /// Emit MCP schemas for all (or selected) tools.
    pub fn to_mcp_schemas(&self, names: Option<&[String]>) -> Vec<Value> {
        self.collect_schemas(names, |tool| tool.schema().to_mcp_schema())
    }

    fn collect_schemas<F>(&self, names: Option<&[String]>, emit: F) -> Vec<Value>
    where
        F: Fn(&Arc<dyn Tool>) -> Value,
    {
        let inner = self.inner.read().unwrap();
        match names {
            Some(selected) => selected
                .iter()
                .filter_map(|n| inner.tools.get(n))
                .map(&emit)
                .collect(),
            None => {
                let mut names: Vec<&String> = inner.tools.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .filter_map(|n| inner.tools.get(n))
                    .map(&emit)
                    .collect()
            }
        }
    }

    /// Per-category counts and tool names.
    pub fn statistics(&self) -> RegistryStats {
        let inner = self.inner.read().unwrap();
        let mut by_category: HashMap<String, usize> = HashMap::new();
        for (cat, names) in &inner.by_category {
            if !names.is_empty() {
                by_category.insert(cat.as_str().to_string(), names.len());
            }
        }
        let mut tool_names: Vec<String> = inner.tools.keys().cloned().collect();
        tool_names.sort();

        RegistryStats {
            total: inner.tools.len(),
            by_category,
            tool_names,
        }
    }
}

/// Registry statistics snapshot.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total: usize,
    pub by_category: HashMap<String, usize>,
    pub tool_names: Vec<String>,
}

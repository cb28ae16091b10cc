//! Graph nodes: named execution units over the workflow state.

use super::state::StateMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Future returned by a node function.
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<StateMap, String>> + Send>>;

/// A node's execution function: takes a cloned state view, returns a
/// partial state to merge.
pub type NodeFn = Arc<dyn Fn(StateMap) -> NodeFuture + Send + Sync>;

/// Box an async closure into a [`NodeFn`].
pub fn node_fn<F, Fut>(f: F) -> NodeFn
where
    F: Fn(StateMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateMap, String>> + Send + 'static,
{
    Arc::new(move |state| Box::pin(f(state)))
}

/// Execution status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Per-node execution configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay between retries.
    pub retry_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Demote failure to skipped and keep going.
    pub continue_on_error: bool,
    /// Free-form metadata.
    pub metadata: HashMap<String, Value>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay: Duration::from_millis(200),
            timeout: None,
            continue_on_error: false,
            metadata: HashMap::new(),
        }
    }
}

impl NodeConfig {
    /// Create a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Demote this node's failure to skipped.
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// Record of one node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub node: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub updates: StateMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl NodeResult {
    /// Whether the node succeeded.
    pub fn success(&self) -> bool {
        self.status == NodeStatus::Succeeded
    }

    /// Execution duration.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// A named execution unit in the graph.
#[derive(Clone)]
pub struct Node {
    name: String,
    func: NodeFn,
    config: NodeConfig,
}

impl Node {
    /// Create a node.
    pub fn new(name: impl Into<String>, config: NodeConfig, func: NodeFn) -> Self {
        Self {
            name: name.into(),
            func,
            config,
        }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Run the node under its retry policy and timeout.
    ///
    /// Never returns an error: failure is captured in the result's status.
    pub async fn execute(&self, state: StateMap) -> NodeResult {
        let started_at = Utc::now();
        let mut attempts: u32 = 0;
        let mut last_error = String::new();

        while attempts <= self.config.retries {
            attempts += 1;

            let attempt = (self.func)(state.clone());
            let outcome = match self.config.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("timed out after {:?}", timeout)),
                },
                None => attempt.await,
            };

            match outcome {
                Ok(updates) => {
                    return NodeResult {
                        node: self.name.clone(),
                        status: NodeStatus::Succeeded,
                        updates,
                        error: None,
                        attempts,
                        started_at,
                        finished_at: Utc::now(),
                    };
                }
                Err(error) => {
                    tracing::debug!(node = %self.name, attempt = attempts, error = %error, "node attempt failed");
                    last_error = error;
                    if attempts <= self.config.retries {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        NodeResult {
            node: self.name.clone(),
            status: NodeStatus::Failed,
            updates: StateMap::new(),
            error: Some(last_error),
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("retries", &self.config.retries)
            .finish()
    }
}

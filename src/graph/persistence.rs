//! Checkpoint persistence for workflows.
//!
//! A checkpoint captures a workflow's progress: the state, the ordered
//! completed-node list, and the step counter. Stores are pluggable; the
//! file-backed store writes one JSON file per workflow id using a
//! write-to-temp plus atomic-rename pattern.

use super::error::{GraphError, GraphResult};
use super::state::StateMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use uuid::Uuid;

/// Terminal or in-flight status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Serializable snapshot of a workflow's progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub workflow_id: String,
    /// Completed node activations so far.
    pub step: u64,
    pub state: StateMap,
    /// Completed node names in completion order.
    pub completed_nodes: Vec<String>,
    pub status: GraphStatus,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a checkpoint stamped with the current time.
    pub fn new(
        workflow_id: impl Into<String>,
        step: u64,
        state: StateMap,
        completed_nodes: Vec<String>,
        status: GraphStatus,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            step,
            state,
            completed_nodes,
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Pluggable checkpoint storage.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint, replacing any previous one for the workflow.
    async fn save(&self, checkpoint: &Checkpoint) -> GraphResult<()>;

    /// Load the checkpoint for a workflow; `None` when absent.
    async fn load(&self, workflow_id: &str) -> GraphResult<Option<Checkpoint>>;

    /// Workflow ids with stored checkpoints.
    async fn list(&self) -> GraphResult<Vec<String>>;

    /// Delete a workflow's checkpoint; returns whether one existed.
    async fn delete(&self, workflow_id: &str) -> GraphResult<bool>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> GraphResult<()> {
        self.checkpoints
            .write()
            .unwrap()
            .insert(checkpoint.workflow_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: &str) -> GraphResult<Option<Checkpoint>> {
        Ok(self.checkpoints.read().unwrap().get(workflow_id).cloned())
    }

    async fn list(&self) -> GraphResult<Vec<String>> {
        let mut ids: Vec<String> = self.checkpoints.read().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, workflow_id: &str) -> GraphResult<bool> {
        Ok(self
            .checkpoints
            .write()
            .unwrap()
            .remove(workflow_id)
            .is_some())
    }
}

/// File-backed store: one `<workflow_id>.json` per workflow.
///
/// Saves write to a temp file in the same directory and commit with an
/// atomic rename, so readers never observe a torn checkpoint.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> GraphResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", workflow_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> GraphResult<()> {
        let target = self.path_for(&checkpoint.workflow_id);
        let temp = self.dir.join(format!(
            "{}.json.tmp.{}",
            checkpoint.workflow_id,
            Uuid::new_v4()
        ));

        let content = serde_json::to_string_pretty(checkpoint)?;
        tokio::fs::write(&temp, content).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(GraphError::store(format!(
                "failed to commit checkpoint for '{}': {}",
                checkpoint.workflow_id, e
            )));
        }

        tracing::debug!(
            workflow_id = %checkpoint.workflow_id,
            step = checkpoint.step,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn load(&self, workflow_id: &str) -> GraphResult<Option<Checkpoint>> {
        let path = self.path_for(workflow_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn list(&self) -> GraphResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, workflow_id: &str) -> GraphResult<bool> {
        match tokio::fs::remove_file(self.path_for(workflow_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

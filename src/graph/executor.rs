//! Compiled graph execution.
//!
//! A worklist-driven executor over the compiled node and edge tables.
//! Parallel branches run concurrently against cloned read-views of the
//! state; their partial results merge back into the canonical state in
//! completion order, so when two branches write the same OVERWRITE field
//! the last-merged value wins.

use super::edge::{Edge, EdgeCollection, END};
use super::error::{GraphError, GraphResult};
use super::events::ExecutionEvent;
use super::node::{Node, NodeResult, NodeStatus};
use super::persistence::{Checkpoint, CheckpointStore, GraphStatus};
use super::state::{StateManager, StateMap, StateSchema};
use crate::cancel::CancelToken;
use futures_util::stream::{FuturesUnordered, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

/// Execution tuning for a compiled graph.
#[derive(Clone, Default)]
pub struct ExecutionConfig {
    /// Cap on total node activations (default 100).
    pub max_iterations: u32,
    /// Total wall-clock budget for a run.
    pub timeout: Option<Duration>,
    /// Persist checkpoints after each completed step.
    pub save_checkpoints: bool,
    /// Where checkpoints go; required for `save_checkpoints` and `resume`.
    pub store: Option<Arc<dyn CheckpointStore>>,
    /// Cooperative cancellation signal.
    pub cancel: Option<CancelToken>,
}

impl std::fmt::Debug for ExecutionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionConfig")
            .field("max_iterations", &self.max_iterations)
            .field("timeout", &self.timeout)
            .field("save_checkpoints", &self.save_checkpoints)
            .field("store", &self.store.as_ref().map(|_| "<CheckpointStore>"))
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl ExecutionConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self {
            max_iterations: 100,
            ..Self::default()
        }
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the total timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable checkpointing into a store.
    pub fn with_persistence(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.save_checkpoints = true;
        self.store = Some(store);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn effective_budget(&self) -> u64 {
        if self.max_iterations == 0 {
            100
        } else {
            u64::from(self.max_iterations)
        }
    }
}

/// Final status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
    IterationExhausted,
    Timeout,
}

/// Result of a workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub state: StateMap,
    pub error: Option<String>,
    /// Total node activations, including those replayed from a checkpoint.
    pub steps: u64,
    pub node_history: Vec<NodeResult>,
}

impl ExecutionResult {
    /// Whether the run completed.
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Stream of execution events; finite, ends with a workflow-terminal event.
pub type ExecutionStream = Pin<Box<dyn Stream<Item = ExecutionEvent> + Send>>;

enum WorkItem {
    Single(String),
    Group(Vec<String>),
}

enum NodeOutcome {
    Finished(NodeResult),
    Cancelled,
    DeadlineExceeded,
}

enum GroupOutcome {
    Item(NodeResult),
    Drained,
    Cancelled,
    DeadlineExceeded,
}

enum StepAction {
    Proceed,
    FailWorkflow(String),
}

fn emit(events: &Option<UnboundedSender<ExecutionEvent>>, event: ExecutionEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// A validated graph ready for execution; cheap to clone.
#[derive(Clone, Debug)]
pub struct CompiledGraph {
    name: String,
    schema: StateSchema,
    nodes: Arc<HashMap<String, Node>>,
    edges: Arc<EdgeCollection>,
    entry: String,
    exits: Arc<BTreeSet<String>>,
    config: ExecutionConfig,
}

impl CompiledGraph {
    pub(crate) fn new(
        name: String,
        schema: StateSchema,
        nodes: HashMap<String, Node>,
        edges: EdgeCollection,
        entry: String,
        exits: BTreeSet<String>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            name,
            schema,
            nodes: Arc::new(nodes),
            edges: Arc::new(edges),
            entry,
            exits: Arc::new(exits),
            config,
        }
    }

    /// Graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute to completion.
    ///
    /// Operational failures (node errors, budget, timeout, cancellation)
    /// come back as the result's status; only invalid initial state and a
    /// non-total conditional router surface as errors.
    pub async fn invoke(&self, workflow_id: &str, initial: StateMap) -> GraphResult<ExecutionResult> {
        self.run_internal(workflow_id, initial, None, None).await
    }

    /// Execute with a streaming event channel.
    ///
    /// Execution is driven by a background task; the stream ends with
    /// `WorkflowCompleted` or `WorkflowFailed`.
    pub fn stream(&self, workflow_id: &str, initial: StateMap) -> ExecutionStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let graph = self.clone();
        let workflow_id = workflow_id.to_string();

        tokio::spawn(async move {
            if let Err(e) = graph
                .run_internal(&workflow_id, initial, None, Some(tx.clone()))
                .await
            {
                let _ = tx.send(ExecutionEvent::WorkflowFailed {
                    error: e.to_string(),
                });
            }
        });

        Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }))
    }

    /// Resume from the stored checkpoint.
    ///
    /// The state and completed set seed the run; completed nodes are
    /// routed through without re-execution.
    pub async fn resume(&self, workflow_id: &str) -> GraphResult<ExecutionResult> {
        let store = self
            .config
            .store
            .clone()
            .ok_or_else(|| GraphError::store("no checkpoint store configured"))?;
        let checkpoint = store
            .load(workflow_id)
            .await?
            .ok_or_else(|| GraphError::CheckpointNotFound(workflow_id.to_string()))?;

        tracing::info!(
            workflow_id,
            step = checkpoint.step,
            completed = checkpoint.completed_nodes.len(),
            "resuming from checkpoint"
        );

        self.run_internal(
            workflow_id,
            checkpoint.state,
            Some((checkpoint.step, checkpoint.completed_nodes)),
            None,
        )
        .await
    }

    async fn run_internal(
        &self,
        workflow_id: &str,
        initial: StateMap,
        seed: Option<(u64, Vec<String>)>,
        events: Option<UnboundedSender<ExecutionEvent>>,
    ) -> GraphResult<ExecutionResult> {
        let budget = self.config.effective_budget();
        let deadline = self.config.timeout.map(|t| Instant::now() + t);

        let mut manager = StateManager::new(self.schema.clone(), initial)?;
        let (mut steps, seed_completed) = seed.unwrap_or((0, Vec::new()));
        let mut skip: HashSet<String> = seed_completed.iter().cloned().collect();
        let mut completed: Vec<String> = seed_completed;
        let mut history: Vec<NodeResult> = Vec::new();

        let mut worklist: VecDeque<WorkItem> = VecDeque::new();
        let mut scheduled: HashSet<String> = HashSet::new();
        let mut ended = false;

        scheduled.insert(self.entry.clone());
        worklist.push_back(WorkItem::Single(self.entry.clone()));

        tracing::debug!(graph = %self.name, workflow_id, "workflow started");

        while let Some(item) = if ended { None } else { worklist.pop_front() } {
            if matches!(&self.config.cancel, Some(c) if c.is_cancelled()) {
                return self
                    .wind_down(
                        workflow_id,
                        GraphStatus::Cancelled,
                        ExecutionStatus::Cancelled,
                        Some(GraphError::Cancelled.to_string()),
                        manager,
                        steps,
                        completed,
                        history,
                        &events,
                    )
                    .await;
            }
            if matches!(deadline, Some(d) if Instant::now() >= d) {
                return self
                    .wind_down(
                        workflow_id,
                        GraphStatus::Failed,
                        ExecutionStatus::Timeout,
                        Some(GraphError::Timeout.to_string()),
                        manager,
                        steps,
                        completed,
                        history,
                        &events,
                    )
                    .await;
            }

            match item {
                WorkItem::Single(name) => {
                    scheduled.remove(&name);

                    // A node restored from the checkpoint is routed
                    // through without re-execution.
                    if skip.remove(&name) {
                        if self.exits.contains(&name) {
                            ended = true;
                        } else {
                            self.route_edges(
                                &name,
                                manager.state(),
                                &mut worklist,
                                &mut scheduled,
                                &mut ended,
                            )?;
                        }
                        continue;
                    }

                    if steps >= budget {
                        return self
                            .exhausted(workflow_id, manager, steps, completed, history, &events)
                            .await;
                    }
                    steps += 1;

                    let Some(node) = self.nodes.get(&name) else {
                        return Err(GraphError::Validation(vec![format!(
                            "node '{}' is not in the compiled graph",
                            name
                        )]));
                    };

                    emit(&events, ExecutionEvent::NodeStarted { node: name.clone() });

                    match self.run_node(node, manager.view(), deadline).await {
                        NodeOutcome::Finished(result) => {
                            let succeeded = result.status == NodeStatus::Succeeded;
                            match self.absorb_result(
                                result,
                                &mut manager,
                                steps,
                                &mut completed,
                                &mut history,
                                &events,
                            ) {
                                StepAction::Proceed => {
                                    self.save_checkpoint(
                                        workflow_id,
                                        steps,
                                        &manager,
                                        &completed,
                                        GraphStatus::Running,
                                    )
                                    .await;

                                    if succeeded && self.exits.contains(&name) {
                                        ended = true;
                                    } else {
                                        self.route_edges(
                                            &name,
                                            manager.state(),
                                            &mut worklist,
                                            &mut scheduled,
                                            &mut ended,
                                        )?;
                                    }
                                }
                                StepAction::FailWorkflow(error) => {
                                    return self
                                        .wind_down(
                                            workflow_id,
                                            GraphStatus::Failed,
                                            ExecutionStatus::Failed,
                                            Some(error),
                                            manager,
                                            steps,
                                            completed,
                                            history,
                                            &events,
                                        )
                                        .await;
                                }
                            }
                        }
                        NodeOutcome::Cancelled => {
                            return self
                                .wind_down(
                                    workflow_id,
                                    GraphStatus::Cancelled,
                                    ExecutionStatus::Cancelled,
                                    Some(GraphError::Cancelled.to_string()),
                                    manager,
                                    steps,
                                    completed,
                                    history,
                                    &events,
                                )
                                .await;
                        }
                        NodeOutcome::DeadlineExceeded => {
                            return self
                                .wind_down(
                                    workflow_id,
                                    GraphStatus::Failed,
                                    ExecutionStatus::Timeout,
                                    Some(GraphError::Timeout.to_string()),
                                    manager,
                                    steps,
                                    completed,
                                    history,
                                    &events,
                                )
                                .await;
                        }
                    }
                }

                WorkItem::Group(targets) => {
                    if targets.iter().any(|t| t == END) {
                        ended = true;
                    }
                    let node_targets: Vec<String> =
                        targets.into_iter().filter(|t| t != END).collect();

                    let mut to_run = Vec::new();
                    for target in &node_targets {
                        if !skip.remove(target) {
                            to_run.push(target.clone());
                        }
                    }

                    if steps + to_run.len() as u64 > budget {
                        return self
                            .exhausted(workflow_id, manager, steps, completed, history, &events)
                            .await;
                    }

                    let mut branches = FuturesUnordered::new();
                    for target in &to_run {
                        let Some(node) = self.nodes.get(target) else {
                            return Err(GraphError::Validation(vec![format!(
                                "node '{}' is not in the compiled graph",
                                target
                            )]));
                        };
                        emit(
                            &events,
                            ExecutionEvent::NodeStarted {
                                node: target.clone(),
                            },
                        );
                        steps += 1;
                        let node = node.clone();
                        let view = manager.view();
                        branches.push(async move { node.execute(view).await });
                    }

                    // Merge branch results in completion order.
                    loop {
                        match self.next_branch(&mut branches, deadline).await {
                            GroupOutcome::Item(result) => {
                                match self.absorb_result(
                                    result,
                                    &mut manager,
                                    steps,
                                    &mut completed,
                                    &mut history,
                                    &events,
                                ) {
                                    StepAction::Proceed => {
                                        self.save_checkpoint(
                                            workflow_id,
                                            steps,
                                            &manager,
                                            &completed,
                                            GraphStatus::Running,
                                        )
                                        .await;
                                    }
                                    StepAction::FailWorkflow(error) => {
                                        return self
                                            .wind_down(
                                                workflow_id,
                                                GraphStatus::Failed,
                                                ExecutionStatus::Failed,
                                                Some(error),
                                                manager,
                                                steps,
                                                completed,
                                                history,
                                                &events,
                                            )
                                            .await;
                                    }
                                }
                            }
                            GroupOutcome::Drained => break,
                            GroupOutcome::Cancelled => {
                                return self
                                    .wind_down(
                                        workflow_id,
                                        GraphStatus::Cancelled,
                                        ExecutionStatus::Cancelled,
                                        Some(GraphError::Cancelled.to_string()),
                                        manager,
                                        steps,
                                        completed,
                                        history,
                                        &events,
                                    )
                                    .await;
                            }
                            GroupOutcome::DeadlineExceeded => {
                                return self
                                    .wind_down(
                                        workflow_id,
                                        GraphStatus::Failed,
                                        ExecutionStatus::Timeout,
                                        Some(GraphError::Timeout.to_string()),
                                        manager,
                                        steps,
                                        completed,
                                        history,
                                        &events,
                                    )
                                    .await;
                            }
                        }
                    }

                    // Join: successor edges of every branch, deduplicated
                    // through the scheduled set so the fan-in node runs once.
                    for target in &node_targets {
                        if self.exits.contains(target) {
                            ended = true;
                            continue;
                        }
                        self.route_edges(
                            target,
                            manager.state(),
                            &mut worklist,
                            &mut scheduled,
                            &mut ended,
                        )?;
                    }
                }
            }
        }

        emit(
            &events,
            ExecutionEvent::WorkflowCompleted {
                state: manager.state().clone(),
            },
        );
        self.save_checkpoint(workflow_id, steps, &manager, &completed, GraphStatus::Completed)
            .await;

        tracing::debug!(graph = %self.name, workflow_id, steps, "workflow completed");

        Ok(ExecutionResult {
            workflow_id: workflow_id.to_string(),
            status: ExecutionStatus::Completed,
            state: manager.state().clone(),
            error: None,
            steps,
            node_history: history,
        })
    }

    async fn run_node(
        &self,
        node: &Node,
        view: StateMap,
        deadline: Option<Instant>,
    ) -> NodeOutcome {
        let exec = node.execute(view);
        tokio::pin!(exec);

        let cancel = self.config.cancel.clone();
        let cancelled = async move {
            match cancel {
                Some(token) => token.cancelled().await,
                None => futures_util::future::pending().await,
            }
        };
        tokio::pin!(cancelled);

        let timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => futures_util::future::pending().await,
            }
        };
        tokio::pin!(timer);

        tokio::select! {
            result = &mut exec => NodeOutcome::Finished(result),
            _ = &mut cancelled => NodeOutcome::Cancelled,
            _ = &mut timer => NodeOutcome::DeadlineExceeded,
        }
    }

    async fn next_branch<F>(
        &self,
        branches: &mut FuturesUnordered<F>,
        deadline: Option<Instant>,
    ) -> GroupOutcome
    where
        F: Future<Output = NodeResult>,
    {
        if branches.is_empty() {
            return GroupOutcome::Drained;
        }

        let cancel = self.config.cancel.clone();
        let cancelled = async move {
            match cancel {
                Some(token) => token.cancelled().await,
                None => futures_util::future::pending().await,
            }
        };
        tokio::pin!(cancelled);

        let timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => futures_util::future::pending().await,
            }
        };
        tokio::pin!(timer);

        tokio::select! {
            item = branches.next() => match item {
                Some(result) => GroupOutcome::Item(result),
                None => GroupOutcome::Drained,
            },
            _ = &mut cancelled => GroupOutcome::Cancelled,
            _ = &mut timer => GroupOutcome::DeadlineExceeded,
        }
    }

    fn absorb_result(
        &self,
        mut result: NodeResult,
        manager: &mut StateManager,
        steps: u64,
        completed: &mut Vec<String>,
        history: &mut Vec<NodeResult>,
        events: &Option<UnboundedSender<ExecutionEvent>>,
    ) -> StepAction {
        let name = result.node.clone();

        if result.status == NodeStatus::Succeeded {
            match manager.apply(result.updates.clone()) {
                Ok(()) => {
                    manager.snapshot(steps);
                    completed.push(name.clone());
                    emit(
                        events,
                        ExecutionEvent::NodeCompleted {
                            node: name,
                            updates: result.updates.clone(),
                        },
                    );
                    emit(
                        events,
                        ExecutionEvent::StateUpdated {
                            state: manager.state().clone(),
                        },
                    );
                    history.push(result);
                    StepAction::Proceed
                }
                Err(e) => {
                    let message = e.to_string();
                    emit(
                        events,
                        ExecutionEvent::NodeFailed {
                            node: name,
                            error: message.clone(),
                        },
                    );
                    result.status = NodeStatus::Failed;
                    result.error = Some(message.clone());
                    history.push(result);
                    StepAction::FailWorkflow(message)
                }
            }
        } else {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string());
            emit(
                events,
                ExecutionEvent::NodeFailed {
                    node: name.clone(),
                    error: error.clone(),
                },
            );

            let demote = self
                .nodes
                .get(&name)
                .map(|n| n.config().continue_on_error)
                .unwrap_or(false);

            if demote {
                tracing::warn!(node = %name, error = %error, "node failed, demoted to skipped");
                result.status = NodeStatus::Skipped;
                history.push(result);
                StepAction::Proceed
            } else {
                history.push(result);
                StepAction::FailWorkflow(format!("node '{}' failed: {}", name, error))
            }
        }
    }

    fn route_edges(
        &self,
        source: &str,
        state: &StateMap,
        worklist: &mut VecDeque<WorkItem>,
        scheduled: &mut HashSet<String>,
        ended: &mut bool,
    ) -> GraphResult<()> {
        for edge in self.edges.outgoing(source) {
            match edge {
                Edge::Fixed { target } => {
                    Self::push_target(target, worklist, scheduled, ended);
                }
                Edge::Conditional { router, branches } => {
                    let key = router(state);
                    match branches.get(&key) {
                        Some(target) => Self::push_target(target, worklist, scheduled, ended),
                        None => {
                            return Err(GraphError::RoutingMissing {
                                node: source.to_string(),
                                key,
                            });
                        }
                    }
                }
                Edge::Parallel { targets } => {
                    worklist.push_back(WorkItem::Group(targets.clone()));
                }
            }
        }
        Ok(())
    }

    fn push_target(
        target: &str,
        worklist: &mut VecDeque<WorkItem>,
        scheduled: &mut HashSet<String>,
        ended: &mut bool,
    ) {
        if target == END {
            *ended = true;
            return;
        }
        if scheduled.insert(target.to_string()) {
            worklist.push_back(WorkItem::Single(target.to_string()));
        }
    }

    async fn exhausted(
        &self,
        workflow_id: &str,
        manager: StateManager,
        steps: u64,
        completed: Vec<String>,
        history: Vec<NodeResult>,
        events: &Option<UnboundedSender<ExecutionEvent>>,
    ) -> GraphResult<ExecutionResult> {
        let budget = self.config.effective_budget() as u32;
        self.wind_down(
            workflow_id,
            GraphStatus::Failed,
            ExecutionStatus::IterationExhausted,
            Some(GraphError::IterationBudgetExceeded { budget }.to_string()),
            manager,
            steps,
            completed,
            history,
            events,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn wind_down(
        &self,
        workflow_id: &str,
        checkpoint_status: GraphStatus,
        status: ExecutionStatus,
        error: Option<String>,
        manager: StateManager,
        steps: u64,
        completed: Vec<String>,
        history: Vec<NodeResult>,
        events: &Option<UnboundedSender<ExecutionEvent>>,
    ) -> GraphResult<ExecutionResult> {
        if let Some(message) = &error {
            emit(
                events,
                ExecutionEvent::WorkflowFailed {
                    error: message.clone(),
                },
            );
            tracing::warn!(graph = %self.name, workflow_id, error = %message, "workflow did not complete");
        }

        self.save_checkpoint(workflow_id, steps, &manager, &completed, checkpoint_status)
            .await;

        Ok(ExecutionResult {
            workflow_id: workflow_id.to_string(),
            status,
            state: manager.state().clone(),
            error,
            steps,
            node_history: history,
        })
    }

    async fn save_checkpoint(
        &self,
        workflow_id: &str,
        steps: u64,
        manager: &StateManager,
        completed: &[String],
        status: GraphStatus,
    ) {
        if !self.config.save_checkpoints {
            return;
        }
        let Some(store) = &self.config.store else {
            return;
        };

        let checkpoint = Checkpoint::new(
            workflow_id,
            steps,
            manager.state().clone(),
            completed.to_vec(),
            status,
        );
        if let Err(e) = store.save(&checkpoint).await {
            tracing::warn!(workflow_id, error = %e, "failed to save checkpoint");
        }
    }
}

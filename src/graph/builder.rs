//! Graph construction and validation.

use super::edge::{Edge, EdgeCollection, RouterFn, END};
use super::error::{GraphError, GraphResult};
use super::executor::{CompiledGraph, ExecutionConfig};
use super::node::{Node, NodeConfig, NodeFn};
use super::state::StateSchema;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Builder for a state graph.
///
/// ```no_run
/// # use hivekit::graph::*;
/// # use serde_json::Map;
/// let graph = StateGraph::new("pipeline")
///     .with_schema(StateSchema::new().field("input", MergeStrategy::Overwrite))
///     .add_node("process", NodeConfig::new(), node_fn(|state| async move {
///         Ok(Map::new())
///     }))
///     .set_entry_point("process")
///     .set_exit_point("process");
/// let compiled = graph.compile(ExecutionConfig::default()).unwrap();
/// ```
pub struct StateGraph {
    name: String,
    schema: StateSchema,
    nodes: HashMap<String, Node>,
    node_order: Vec<String>,
    edges: EdgeCollection,
    entry: Option<String>,
    exits: BTreeSet<String>,
    build_errors: Vec<String>,
}

impl StateGraph {
    /// Start a graph with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: StateSchema::new().allow_undeclared(),
            nodes: HashMap::new(),
            node_order: Vec::new(),
            edges: EdgeCollection::new(),
            entry: None,
            exits: BTreeSet::new(),
            build_errors: Vec::new(),
        }
    }

    /// Declare the state schema; replaces the default open schema.
    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Add a node.
    pub fn add_node(mut self, name: impl Into<String>, config: NodeConfig, func: NodeFn) -> Self {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            self.build_errors
                .push(format!("duplicate node name '{}'", name));
            return self;
        }
        self.node_order.push(name.clone());
        self.nodes.insert(name.clone(), Node::new(name, config, func));
        self
    }

    /// Add a fixed edge.
    pub fn add_edge(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edges.add(
            source,
            Edge::Fixed {
                target: target.into(),
            },
        );
        self
    }

    /// Add a conditional edge: the router's return value indexes into the
    /// branch map. Branch targets may be [`END`].
    pub fn add_conditional_edge<K, V>(
        mut self,
        source: impl Into<String>,
        router: RouterFn,
        branches: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let branches: HashMap<String, String> = branches
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.edges.add(source, Edge::Conditional { router, branches });
        self
    }

    /// Add a parallel edge fanning out to every target.
    pub fn add_parallel_edge<T>(
        mut self,
        source: impl Into<String>,
        targets: impl IntoIterator<Item = T>,
    ) -> Self
    where
        T: Into<String>,
    {
        let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        if targets.len() < 2 {
            self.build_errors
                .push("parallel edge requires at least 2 targets".to_string());
            return self;
        }
        self.edges.add(source, Edge::Parallel { targets });
        self
    }

    /// Choose the entry node.
    pub fn set_entry_point(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.entry.is_some() {
            self.build_errors
                .push("entry point set more than once".to_string());
        }
        self.entry = Some(name);
        self
    }

    /// Mark an exit node; execution stops once it succeeds.
    pub fn set_exit_point(mut self, name: impl Into<String>) -> Self {
        self.exits.insert(name.into());
        self
    }

    /// Validate the graph structure; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.build_errors.clone();

        if self.nodes.is_empty() {
            errors.push("graph has no nodes".to_string());
        }

        let entry = match &self.entry {
            Some(entry) => {
                if !self.nodes.contains_key(entry) {
                    errors.push(format!("entry point '{}' is not a node", entry));
                }
                Some(entry.clone())
            }
            None => {
                errors.push("graph has no entry point".to_string());
                None
            }
        };

        for exit in &self.exits {
            if !self.nodes.contains_key(exit) {
                errors.push(format!("exit point '{}' is not a node", exit));
            }
        }

        for (source, edge) in self.edges.iter() {
            if source != END && !self.nodes.contains_key(source) {
                errors.push(format!("edge source '{}' is not a node", source));
            }
            for target in edge.static_targets() {
                if target != END && !self.nodes.contains_key(target) {
                    errors.push(format!("edge target '{}' is not a node", target));
                }
            }
        }

        // Reachability from the entry over statically known targets.
        if let Some(entry) = entry {
            if self.nodes.contains_key(&entry) {
                let reachable = self.reachable_from(&entry);
                for name in &self.node_order {
                    if !reachable.contains(name.as_str()) {
                        errors.push(format!("node '{}' is not reachable from the entry", name));
                    }
                }

                // At least one path from the entry must terminate: at END,
                // at a declared exit, or at a node with no outgoing edges.
                let terminates = reachable.contains(END)
                    || self.exits.iter().any(|e| reachable.contains(e.as_str()))
                    || reachable
                        .iter()
                        .any(|n| *n != END && self.edges.outgoing(n).is_empty());
                if !terminates {
                    errors.push("no path from the entry reaches an exit".to_string());
                }
            }
        }

        errors
    }

    fn reachable_from(&self, entry: &str) -> HashSet<&str> {
        let mut reachable: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        if let Some((name, _)) = self.nodes.get_key_value(entry) {
            reachable.insert(name.as_str());
            queue.push_back(name.as_str());
        }

        while let Some(current) = queue.pop_front() {
            for edge in self.edges.outgoing(current) {
                for target in edge.static_targets() {
                    if reachable.insert(target) && target != END {
                        queue.push_back(target);
                    }
                }
            }
        }
        reachable
    }

    /// Text rendering of the graph for diagnostics.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("Graph: {}", self.name), "=".repeat(40)];

        lines.push("Nodes:".to_string());
        for name in &self.node_order {
            let marker = match (&self.entry, self.exits.contains(name)) {
                (Some(entry), _) if entry == name => " (entry)",
                (_, true) => " (exit)",
                _ => "",
            };
            lines.push(format!("  - {}{}", name, marker));
        }

        lines.push("Edges:".to_string());
        let mut edge_lines: Vec<String> = self
            .edges
            .iter()
            .map(|(source, edge)| match edge {
                Edge::Fixed { target } => format!("  {} -> {}", source, target),
                Edge::Conditional { branches, .. } => {
                    let mut keys: Vec<&String> = branches.keys().collect();
                    keys.sort();
                    let arms: Vec<String> = keys
                        .iter()
                        .map(|k| format!("{} => {}", k, branches[*k]))
                        .collect();
                    format!("  {} -> [{}] (conditional)", source, arms.join(", "))
                }
                Edge::Parallel { targets } => {
                    format!("  {} -> [{}] (parallel)", source, targets.join(", "))
                }
            })
            .collect();
        edge_lines.sort();
        lines.extend(edge_lines);

        lines.join("\n")
    }

    /// Compile the graph for execution.
    pub fn compile(self, config: ExecutionConfig) -> GraphResult<CompiledGraph> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(GraphError::Validation(errors));
        }

        tracing::debug!(
            graph = %self.name,
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "graph compiled"
        );

        Ok(CompiledGraph::new(
            self.name,
            self.schema,
            self.nodes,
            self.edges,
            self.entry.unwrap_or_default(),
            self.exits,
            config,
        ))
    }
}

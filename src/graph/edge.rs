//! Graph edges: fixed, conditional, and parallel.

use super::state::StateMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the virtual terminal node.
pub const END: &str = "__end__";

/// Router function for conditional edges: maps the current state to a
/// branch key.
pub type RouterFn = Arc<dyn Fn(&StateMap) -> String + Send + Sync>;

/// Box a closure into a [`RouterFn`].
pub fn router_fn<F>(f: F) -> RouterFn
where
    F: Fn(&StateMap) -> String + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A directed relation between nodes.
#[derive(Clone)]
pub enum Edge {
    /// Unconditional transition.
    Fixed { target: String },
    /// Router picks a branch key; the map resolves it to a target
    /// (possibly [`END`]).
    Conditional {
        router: RouterFn,
        branches: HashMap<String, String>,
    },
    /// Fan out to every target.
    Parallel { targets: Vec<String> },
}

impl Edge {
    /// All statically known targets, for validation and reachability.
    pub fn static_targets(&self) -> Vec<&str> {
        match self {
            Edge::Fixed { target } => vec![target.as_str()],
            Edge::Conditional { branches, .. } => {
                branches.values().map(String::as_str).collect()
            }
            Edge::Parallel { targets } => targets.iter().map(String::as_str).collect(),
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Fixed { target } => write!(f, "Fixed -> {}", target),
            Edge::Conditional { branches, .. } => {
                write!(f, "Conditional -> {:?}", branches.values().collect::<Vec<_>>())
            }
            Edge::Parallel { targets } => write!(f, "Parallel -> {:?}", targets),
        }
    }
}

/// Outgoing edges indexed by source node.
#[derive(Debug, Clone, Default)]
pub struct EdgeCollection {
    outgoing: HashMap<String, Vec<Edge>>,
}

impl EdgeCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge leaving `source`.
    pub fn add(&mut self, source: impl Into<String>, edge: Edge) {
        self.outgoing.entry(source.into()).or_default().push(edge);
    }

    /// Edges leaving a node.
    pub fn outgoing(&self, source: &str) -> &[Edge] {
        self.outgoing.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All `(source, edge)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Edge)> {
        self.outgoing
            .iter()
            .flat_map(|(source, edges)| edges.iter().map(move |e| (source.as_str(), e)))
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

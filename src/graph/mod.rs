//! State-graph workflow engine.
//!
//! Declarative directed graphs of nodes and edges over a typed state.
//! Build with [`StateGraph`], compile into a [`CompiledGraph`], then
//! `invoke`, `stream`, or `resume`. State fields merge through declared
//! [`MergeStrategy`] values; progress persists through a pluggable
//! [`CheckpointStore`].

mod builder;
mod edge;
mod error;
mod events;
mod executor;
mod node;
mod persistence;
mod state;

pub use builder::StateGraph;
pub use edge::{router_fn, Edge, EdgeCollection, RouterFn, END};
pub use error::{GraphError, GraphResult};
pub use events::ExecutionEvent;
pub use executor::{
    CompiledGraph, ExecutionConfig, ExecutionResult, ExecutionStatus, ExecutionStream,
};
pub use node::{node_fn, Node, NodeConfig, NodeFn, NodeResult, NodeStatus};
pub use persistence::{
    Checkpoint, CheckpointStore, FileCheckpointStore, GraphStatus, MemoryCheckpointStore,
};
pub use state::{
    merge_values, MergeStrategy, StateManager, StateMap, StateSchema, StateSnapshot,
};

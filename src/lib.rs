//! Hivekit - agent orchestration kit
//!
//! A runtime for cooperating LLM agents: a unified chat client, a tool
//! registry with dual schema dialects, an in-process message bus, a
//! multi-agent orchestrator, and a state-graph workflow engine with
//! checkpointing.
//!
//! - **`config`** - LLM endpoint configuration and environment loading
//! - **`llm`** - chat, streaming chat, and tool-augmented chat over an
//!   OpenAI-compatible endpoint, with rate limiting and retries
//! - **`tools`** - tool schemas, validation, and fail-safe execution
//! - **`agent`** - base agent, planner, ReAct loop, and debate judge
//! - **`bus`** - point-to-point, broadcast, topic, and request-reply
//!   routing with bounded priority inboxes
//! - **`orchestration`** - sequential, parallel, debate, vote, and
//!   consensus coordination
//! - **`graph`** - declarative state graphs with merge strategies,
//!   conditional routing, parallel fan-out, streaming, and checkpoints
//!
//! # Example: a two-node workflow
//!
//! ```ignore
//! use hivekit::graph::*;
//! use serde_json::json;
//!
//! let graph = StateGraph::new("pipeline")
//!     .with_schema(
//!         StateSchema::new()
//!             .field("input", MergeStrategy::Overwrite)
//!             .field("result", MergeStrategy::Overwrite),
//!     )
//!     .add_node("process", NodeConfig::new(), node_fn(|state| async move {
//!         let input = state["input"].as_str().unwrap_or_default();
//!         let mut updates = StateMap::new();
//!         updates.insert("result".into(), json!(input.to_uppercase()));
//!         Ok(updates)
//!     }))
//!     .set_entry_point("process")
//!     .set_exit_point("process");
//!
//! let compiled = graph.compile(ExecutionConfig::new())?;
//! let result = compiled.invoke("run-1", initial_state).await?;
//! ```
//!
//! # Example: orchestrating agents
//!
//! ```ignore
//! use hivekit::prelude::*;
//!
//! let llm = Arc::new(OpenAiClient::from_env()?);
//! let mut orchestrator = Orchestrator::new(llm.clone());
//! orchestrator.register_agent(Arc::new(ChatAgent::new(
//!     AgentConfig::new("optimist", "optimistic analyst"),
//!     llm.clone(),
//! )))?;
//! let result = orchestrator.run_debate("adopt the proposal?", &DebateConfig::default()).await;
//! ```

pub mod agent;
pub mod bus;
pub mod cancel;
pub mod config;
pub mod graph;
pub mod llm;
pub mod orchestration;
pub mod tools;

/// Convenient imports for the common surface.
pub mod prelude {
    pub use crate::agent::{
        Agent, AgentConfig, AgentError, AgentState, BaseAgent, ChatAgent, ConversationContext,
        DebateJudge, DebateTurn, Judgment, JudgeDecision, Plan, PlanStep, Planner, ReactAgent,
        ReactOutcome, ReactStatus,
    };
    pub use crate::bus::{
        BusConfig, BusError, Message, MessageBus, MessageKind, OverflowPolicy, Priority,
    };
    pub use crate::cancel::CancelToken;
    pub use crate::config::{ConfigError, LlmConfig};
    pub use crate::graph::{
        node_fn, router_fn, Checkpoint, CheckpointStore, CompiledGraph, ExecutionConfig,
        ExecutionEvent, ExecutionResult, ExecutionStatus, FileCheckpointStore, GraphError,
        MemoryCheckpointStore, MergeStrategy, NodeConfig, StateGraph, StateMap, StateSchema, END,
    };
    pub use crate::llm::{
        ChatMessage, ChatOptions, LlmClient, LlmError, LlmResponse, OpenAiClient, Role,
        StreamDelta, ToolChoice,
    };
    pub use crate::orchestration::{
        AgentOutput, ConsensusConfig, DebateConfig, OrchestrationMode, Orchestrator, TaskResult,
        TaskStatus,
    };
    pub use crate::tools::{
        ParameterKind, Tool, ToolCategory, ToolParameter, ToolRegistry, ToolResult, ToolSchema,
    };
}

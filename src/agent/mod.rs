//! Agent runtime.
//!
//! [`BaseAgent`] wraps an LLM reference, an optional tool registry, and a
//! bounded conversation context. Concrete strategies build on it: a
//! one-shot [`Planner`], a bounded [`ReactAgent`] loop, and the
//! [`DebateJudge`] consulted by the orchestrator. Agents never raise to
//! their caller: failures become error-kind replies.

mod context;
mod judge;
pub mod parser;
mod planner;
mod react;

pub use context::ConversationContext;
pub use judge::{DebateJudge, DebateTurn, Judgment, JudgeDecision};
pub use planner::{Plan, PlanStep, Planner};
pub use react::{ActionRecord, ReactAgent, ReactOutcome, ReactStatus, ReactStep};

use crate::bus::Message;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, LlmError, Role};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors raised by agent strategies.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("failed to parse model output: {0}")]
    Parse(String),
}

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Thinking,
    Acting,
    Done,
    Error,
}

/// Configuration shared by all agent strategies.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub role: String,
    pub description: String,
    /// Overrides the generated system prompt when set.
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Iteration budget for looping strategies.
    pub max_iterations: u32,
    pub memory_enabled: bool,
    pub memory_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            role: "general assistant".to_string(),
            description: String::new(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 4096,
            max_iterations: 5,
            memory_enabled: true,
            memory_window: 20,
        }
    }
}

impl AgentConfig {
    /// Create a configuration with a name and role.
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Override the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enable or disable conversation memory.
    pub fn with_memory(mut self, enabled: bool) -> Self {
        self.memory_enabled = enabled;
        self
    }

    /// Set the memory window size.
    pub fn with_memory_window(mut self, window: usize) -> Self {
        self.memory_window = window;
        self
    }
}

/// A named unit that consumes and produces messages by calling an LLM.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier used for bus registration.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Handle an inbound message, always producing a reply.
    async fn handle(&self, message: Message) -> Message;

    /// Run the agent's strategy on a task.
    async fn execute(&self, task: &str) -> AgentResult<String>;
}

/// Shared plumbing for agent strategies.
pub struct BaseAgent {
    id: String,
    config: AgentConfig,
    llm: Arc<dyn LlmClient>,
    tools: Option<ToolRegistry>,
    context: Mutex<ConversationContext>,
    state: RwLock<AgentState>,
}

impl BaseAgent {
    /// Create an agent around an LLM client.
    pub fn new(config: AgentConfig, llm: Arc<dyn LlmClient>) -> Self {
        let context = ConversationContext::new(config.memory_window);
        Self {
            id: Uuid::new_v4().to_string(),
            config,
            llm,
            tools: None,
            context: Mutex::new(context),
            state: RwLock::new(AgentState::Idle),
        }
    }

    /// Attach a tool registry.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Stable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Agent configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The LLM client.
    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    /// The tool registry, if attached.
    pub fn tools(&self) -> Option<&ToolRegistry> {
        self.tools.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AgentState {
        *self.state.read().unwrap()
    }

    pub(crate) fn set_state(&self, state: AgentState) {
        *self.state.write().unwrap() = state;
    }

    /// The effective system prompt.
    pub fn system_prompt(&self) -> String {
        if let Some(prompt) = &self.config.system_prompt {
            return prompt.clone();
        }
        format!(
            "You are {}, a {}.\n\n{}\n\nStay in character and answer professionally.",
            self.config.name, self.config.role, self.config.description
        )
    }

    pub(crate) fn chat_opts(&self) -> ChatOptions {
        ChatOptions::new()
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
    }

    /// One chat exchange, honoring the configured memory setting.
    pub async fn chat(&self, user_message: &str) -> AgentResult<String> {
        self.chat_with(user_message, self.config.memory_enabled).await
    }

    /// One chat exchange without touching memory.
    pub async fn chat_detached(&self, user_message: &str) -> AgentResult<String> {
        self.chat_with(user_message, false).await
    }

    async fn chat_with(&self, user_message: &str, use_memory: bool) -> AgentResult<String> {
        let mut messages = vec![ChatMessage::system(self.system_prompt())];

        if use_memory {
            let context = self.context.lock().await;
            for (role, content) in context.turns() {
                messages.push(ChatMessage {
                    role: *role,
                    content: content.clone(),
                });
            }
        }
        messages.push(ChatMessage::user(user_message));

        let response = self.llm.chat(&messages, &self.chat_opts()).await?;

        if use_memory {
            let mut context = self.context.lock().await;
            context.push(Role::User, user_message);
            context.push(Role::Assistant, response.content.clone());
        }

        Ok(response.content)
    }

    /// Handle an inbound bus message, producing a reply.
    ///
    /// Failures are converted into an error-kind reply; this method never
    /// returns an error.
    pub async fn handle_message(&self, message: Message) -> Message {
        self.set_state(AgentState::Thinking);
        tracing::debug!(
            agent = %self.config.name,
            sender = %message.sender,
            "handling message"
        );

        match self.chat(&message.payload.content).await {
            Ok(content) => {
                self.set_state(AgentState::Idle);
                message.reply(content)
            }
            Err(err) => {
                tracing::warn!(agent = %self.config.name, error = %err, "message handling failed");
                self.set_state(AgentState::Error);
                message.error_reply(format!("processing failed: {}", err))
            }
        }
    }

    /// Reset state and conversation memory.
    pub async fn reset(&self) {
        self.context.lock().await.clear();
        self.set_state(AgentState::Idle);
    }

    /// Number of retained conversation turns.
    pub async fn context_len(&self) -> usize {
        self.context.lock().await.len()
    }
}

/// Plain conversational agent with no strategy beyond chat.
pub struct ChatAgent {
    base: BaseAgent,
}

impl ChatAgent {
    /// Create a chat agent.
    pub fn new(config: AgentConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            base: BaseAgent::new(config, llm),
        }
    }

    /// Access the underlying base agent.
    pub fn base(&self) -> &BaseAgent {
        &self.base
    }
}

#[async_trait]
impl Agent for ChatAgent {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    async fn handle(&self, message: Message) -> Message {
        self.base.handle_message(message).await
    }

    async fn execute(&self, task: &str) -> AgentResult<String> {
        self.base.chat(task).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted LLM client for unit tests.

    use crate::llm::{
        ChatMessage, ChatOptions, ChatStream, FinishReason, LlmClient, LlmResponse, LlmResult,
        StreamDelta, TokenUsage,
    };
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of responses; repeats the last one.
    pub struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedLlm {
        pub fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _opts: &ChatOptions,
        ) -> LlmResult<LlmResponse> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let responses = self.responses.lock().unwrap();
            let content = responses
                .get(index)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or_default();
            Ok(LlmResponse {
                content,
                model: "scripted".to_string(),
                finish_reason: FinishReason::Stop,
                usage: TokenUsage::new(1, 1),
                tool_calls: vec![],
            })
        }

        async fn chat_stream(
            &self,
            messages: &[ChatMessage],
            opts: &ChatOptions,
        ) -> LlmResult<ChatStream> {
            let response = self.chat(messages, opts).await?;
            let deltas = vec![
                Ok(StreamDelta::Content(response.content)),
                Ok(StreamDelta::Done {
                    finish_reason: FinishReason::Stop,
                    tool_calls: vec![],
                }),
            ];
            Ok(Box::pin(futures_util::stream::iter(deltas)))
        }

        async fn chat_with_tools(
            &self,
            messages: &[ChatMessage],
            _tools: Vec<Value>,
            opts: &ChatOptions,
        ) -> LlmResult<LlmResponse> {
            self.chat(messages, opts).await
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn provider_name(&self) -> &str {
            "test"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedLlm;
    use super::*;

    fn base_with(responses: Vec<&str>) -> BaseAgent {
        BaseAgent::new(
            AgentConfig::new("tester", "unit test subject"),
            Arc::new(ScriptedLlm::new(responses)),
        )
    }

    #[tokio::test]
    async fn chat_appends_memory() {
        let agent = base_with(vec!["first", "second"]);

        assert_eq!(agent.chat("hello").await.unwrap(), "first");
        assert_eq!(agent.chat("again").await.unwrap(), "second");
        // Two exchanges = four turns.
        assert_eq!(agent.context_len().await, 4);
    }

    #[tokio::test]
    async fn detached_chat_leaves_memory_alone() {
        let agent = base_with(vec!["reply"]);
        agent.chat_detached("hello").await.unwrap();
        assert_eq!(agent.context_len().await, 0);
    }

    #[tokio::test]
    async fn memory_window_bounds_turns() {
        let config = AgentConfig::new("t", "r").with_memory_window(3);
        let agent = BaseAgent::new(config, Arc::new(ScriptedLlm::new(vec!["r"])));

        for _ in 0..5 {
            agent.chat("x").await.unwrap();
        }
        assert_eq!(agent.context_len().await, 3);
    }

    #[tokio::test]
    async fn handle_message_produces_reply() {
        let agent = base_with(vec!["pong"]);
        let reply = agent
            .handle_message(Message::request("alice", agent.id(), "ping"))
            .await;

        assert_eq!(reply.payload.content, "pong");
        assert_eq!(reply.receiver.as_deref(), Some("alice"));
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn chat_agent_implements_agent_trait() {
        let agent = ChatAgent::new(
            AgentConfig::new("chatty", "conversationalist"),
            Arc::new(ScriptedLlm::new(vec!["sure"])),
        );

        assert_eq!(agent.name(), "chatty");
        assert_eq!(agent.execute("do a thing").await.unwrap(), "sure");
    }

    #[test]
    fn system_prompt_override() {
        let config = AgentConfig::new("a", "b").with_system_prompt("custom prompt");
        let agent = BaseAgent::new(config, Arc::new(ScriptedLlm::new(vec![])));
        assert_eq!(agent.system_prompt(), "custom prompt");
    }

    #[test]
    fn generated_system_prompt_mentions_identity() {
        let config =
            AgentConfig::new("analyst", "data analyst").with_description("Knows statistics.");
        let agent = BaseAgent::new(config, Arc::new(ScriptedLlm::new(vec![])));
        let prompt = agent.system_prompt();
        assert!(prompt.contains("analyst"));
        assert!(prompt.contains("Knows statistics."));
    }
}

//! LLM client core.
//!
//! A thin façade over an OpenAI-compatible chat endpoint with three call
//! shapes: blocking chat, token-streamed chat, and tool-augmented chat.
//! Local rate limiting and retry with exponential backoff are applied to
//! every outbound request.

mod error;
mod openai;
mod rate_limit;
mod retry;
mod types;

pub use error::{LlmError, LlmResult};
pub use openai::OpenAiClient;
pub use rate_limit::TokenBucket;
pub use retry::RetryPolicy;
pub use types::{
    ChatMessage, ChatOptions, FinishReason, LlmResponse, Role, StreamDelta, TokenUsage,
    ToolCallRequest, ToolChoice,
};

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use std::pin::Pin;

/// Stream of incremental chat deltas, finite and terminated by
/// [`StreamDelta::Done`].
pub type ChatStream = Pin<Box<dyn Stream<Item = LlmResult<StreamDelta>> + Send>>;

/// Unified chat interface implemented by every LLM backend.
///
/// Implementations are immutable after construction; concurrent calls are
/// supported.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single blocking chat call.
    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> LlmResult<LlmResponse>;

    /// Token-streamed chat call.
    ///
    /// The stream is finite and restartable only from the beginning;
    /// tool-call deltas are assembled internally and surfaced on the
    /// terminal frame.
    async fn chat_stream(&self, messages: &[ChatMessage], opts: &ChatOptions)
        -> LlmResult<ChatStream>;

    /// Chat with tools offered; `tool_choice` defaults to `auto`.
    ///
    /// The returned response may carry populated `tool_calls`.
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Vec<Value>,
        opts: &ChatOptions,
    ) -> LlmResult<LlmResponse>;

    /// Model identifier used for requests.
    fn model_name(&self) -> &str;

    /// Provider identifier, for logging.
    fn provider_name(&self) -> &str;
}

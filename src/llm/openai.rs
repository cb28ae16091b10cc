//! OpenAI-compatible chat client.
//!
//! Speaks the chat-completions wire dialect against any endpoint that
//! implements it; the base URL is configurable so local inference servers
//! work unchanged. All calls pass through the local token bucket and the
//! retry policy before touching the network.

use super::error::{LlmError, LlmResult};
use super::rate_limit::TokenBucket;
use super::retry::RetryPolicy;
use super::types::{
    ChatMessage, ChatOptions, FinishReason, LlmResponse, StreamDelta, TokenUsage, ToolCallRequest,
    ToolChoice,
};
use super::{ChatStream, LlmClient};
use crate::cancel::CancelToken;
use crate::config::{ConfigError, LlmConfig};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Client for OpenAI-compatible chat-completions endpoints.
#[derive(Debug)]
pub struct OpenAiClient {
    config: LlmConfig,
    client: reqwest::Client,
    bucket: TokenBucket,
    retry: RetryPolicy,
    cancel: Option<CancelToken>,
}

impl OpenAiClient {
    /// Create a client from an explicit configuration.
    ///
    /// Fails with a configuration error when the API key is missing or the
    /// configuration is otherwise invalid.
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        config.validate()?;
        if config.api_key.is_none() {
            return Err(LlmError::Config(ConfigError::MissingKey(
                "api_key".to_string(),
            )));
        }

        let bucket = TokenBucket::new(
            config.rate_limit,
            Duration::from_secs(config.rate_interval_secs),
        );
        let retry = RetryPolicy::new(config.max_retries);

        tracing::info!(
            provider = %config.provider,
            model = %config.model,
            base_url = %config.base_url,
            "LLM client initialized"
        );

        Ok(Self {
            config,
            client: reqwest::Client::new(),
            bucket,
            retry,
            cancel: None,
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> LlmResult<Self> {
        Self::new(LlmConfig::from_env()?)
    }

    /// Attach a cancellation token; in-flight requests abort with
    /// [`LlmError::Cancelled`] when it fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Race a call against the attached cancellation token.
    async fn guarded<T>(
        &self,
        call: impl std::future::Future<Output = LlmResult<T>>,
    ) -> LlmResult<T> {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    result = call => result,
                    _ = token.cancelled() => Err(LlmError::Cancelled),
                }
            }
            None => call.await,
        }
    }

    fn api_key(&self) -> &str {
        // Presence checked at construction.
        self.config.api_key.as_deref().unwrap_or_default()
    }

    fn request_timeout(&self, opts: &ChatOptions) -> Duration {
        opts.timeout
            .unwrap_or_else(|| Duration::from_secs(self.config.timeout_secs))
    }

    /// Assemble the request body for the chat-completions endpoint.
    fn build_request_body(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
        stream: bool,
    ) -> Value {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": wire_messages,
            "temperature": opts.temperature.unwrap_or(self.config.temperature),
            "max_tokens": opts.max_tokens.unwrap_or(self.config.max_tokens),
            "top_p": opts.top_p.unwrap_or(self.config.top_p),
        });

        if !opts.stop.is_empty() {
            body["stop"] = json!(opts.stop);
        }

        if let Some(tools) = &opts.tools {
            if !tools.is_empty() {
                body["tools"] = json!(tools);
                if let Some(choice) = &opts.tool_choice {
                    body["tool_choice"] = choice.to_wire();
                }
            }
        }

        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    async fn send_chat(&self, body: &Value, timeout: Duration) -> LlmResult<LlmResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);

        tracing::debug!(model = %self.config.model, url = %url, "sending chat request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key()))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(status_error(status.as_u16(), message));
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parse_response(api_response)
    }

    async fn open_stream(&self, body: &Value, timeout: Duration) -> LlmResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key()))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(status_error(status.as_u16(), message));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> LlmResult<LlmResponse> {
        self.bucket.acquire().await;

        let body = self.build_request_body(messages, opts, false);
        let timeout = self.request_timeout(opts);

        self.guarded(self.retry.run(|| self.send_chat(&body, timeout)))
            .await
    }

    async fn chat_stream(&self, messages: &[ChatMessage], opts: &ChatOptions) -> LlmResult<ChatStream> {
        self.bucket.acquire().await;

        let body = self.build_request_body(messages, opts, true);
        let timeout = self.request_timeout(opts);

        // Only the initial connection is retried; a stream that has begun
        // yielding deltas is restartable from the beginning only.
        let response = self
            .guarded(self.retry.run(|| self.open_stream(&body, timeout)))
            .await?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<LlmResult<StreamDelta>>();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut assembler = ToolCallAssembler::new();
            let mut finish_reason = FinishReason::Stop;

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(map_transport_error(e)));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete SSE events.
                while let Some(event_end) = buffer.find("\n\n") {
                    let event = buffer[..event_end].to_string();
                    buffer = buffer[event_end + 2..].to_string();

                    for line in event.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };

                        if data.trim() == "[DONE]" {
                            let _ = tx.send(Ok(StreamDelta::Done {
                                finish_reason: finish_reason.clone(),
                                tool_calls: assembler.finish(),
                            }));
                            return;
                        }

                        let frame: StreamFrame = match serde_json::from_str(data) {
                            Ok(f) => f,
                            Err(e) => {
                                let _ = tx.send(Err(LlmError::InvalidResponse(e.to_string())));
                                return;
                            }
                        };

                        for choice in frame.choices {
                            if let Some(reason) = choice.finish_reason {
                                finish_reason = FinishReason::parse(&reason);
                            }
                            if let Some(content) = choice.delta.content {
                                if !content.is_empty() {
                                    let _ = tx.send(Ok(StreamDelta::Content(content)));
                                }
                            }
                            if let Some(calls) = choice.delta.tool_calls {
                                assembler.absorb(calls);
                            }
                        }
                    }
                }
            }

            // Upstream closed without [DONE]: surface what was assembled.
            let _ = tx.send(Ok(StreamDelta::Done {
                finish_reason,
                tool_calls: assembler.finish(),
            }));
        });

        Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Vec<Value>,
        opts: &ChatOptions,
    ) -> LlmResult<LlmResponse> {
        let mut opts = opts.clone();
        opts.tools = Some(tools);
        if opts.tool_choice.is_none() {
            opts.tool_choice = Some(ToolChoice::Auto);
        }
        self.chat(messages, &opts).await
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_name(&self) -> &str {
        &self.config.provider
    }
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(e)
    }
}

fn status_error(status: u16, message: String) -> LlmError {
    if status == 429 {
        LlmError::RateLimited
    } else {
        LlmError::Upstream { status, message }
    }
}

fn parse_response(response: ChatCompletionResponse) -> LlmResult<LlmResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

    let tool_calls: Vec<ToolCallRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let arguments: Map<String, Value> =
                serde_json::from_str(&tc.function.arguments).unwrap_or_default();
            ToolCallRequest {
                id: tc.id,
                name: tc.function.name,
                arguments,
            }
        })
        .collect();

    let finish_reason = if !tool_calls.is_empty() {
        FinishReason::ToolCalls
    } else {
        FinishReason::parse(&choice.finish_reason)
    };

    let usage = response
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        model: response.model,
        finish_reason,
        usage,
        tool_calls,
    })
}

/// Assembles tool-call fragments arriving across stream frames.
struct ToolCallAssembler {
    partial: BTreeMap<usize, PartialToolCall>,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembler {
    fn new() -> Self {
        Self {
            partial: BTreeMap::new(),
        }
    }

    fn absorb(&mut self, deltas: Vec<StreamToolCallDelta>) {
        for delta in deltas {
            let entry = self.partial.entry(delta.index).or_default();
            if let Some(id) = delta.id {
                entry.id = id;
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    entry.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    entry.arguments.push_str(&arguments);
                }
            }
        }
    }

    fn finish(self) -> Vec<ToolCallRequest> {
        self.partial
            .into_values()
            .filter(|p| !p.name.is_empty())
            .map(|p| ToolCallRequest {
                id: p.id,
                name: p.name,
                arguments: serde_json::from_str(&p.arguments).unwrap_or_default(),
            })
            .collect()
    }
}

// Wire types for the chat-completions response.

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    finish_reason: String,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDeltaFrame,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDeltaFrame {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> OpenAiClient {
        OpenAiClient::new(LlmConfig::new().with_api_key("sk-test").with_model("gpt-4o")).unwrap()
    }

    #[test]
    fn construction_requires_api_key() {
        let err = OpenAiClient::new(LlmConfig::new()).unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn request_body_basic() {
        let client = test_client();
        let messages = vec![ChatMessage::user("Hello")];
        let body = client.build_request_body(&messages, &ChatOptions::new(), false);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!(body.get("stream").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn request_body_with_options() {
        let client = test_client();
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let opts = ChatOptions::new()
            .with_temperature(0.1)
            .with_max_tokens(128)
            .with_stop(vec!["END".to_string()]);
        let body = client.build_request_body(&messages, &opts, true);

        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["stop"][0], "END");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn request_body_with_tools() {
        let client = test_client();
        let messages = vec![ChatMessage::user("weather?")];
        let tools = vec![json!({
            "type": "function",
            "function": {"name": "get_weather", "description": "", "parameters": {}}
        })];
        let opts = ChatOptions::new()
            .with_tools(tools)
            .with_tool_choice(ToolChoice::Auto);
        let body = client.build_request_body(&messages, &opts, false);

        assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn parse_plain_response() {
        let raw = json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {"content": "Hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        });
        let response: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response).unwrap();

        assert_eq!(parsed.content, "Hello there");
        assert_eq!(parsed.finish_reason, FinishReason::Stop);
        assert_eq!(parsed.usage.total_tokens, 16);
        assert!(!parsed.has_tool_calls());
    }

    #[test]
    fn parse_tool_call_response() {
        let raw = json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "get_weather", "arguments": "{\"city\": \"Oslo\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": null
        });
        let response: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response).unwrap();

        assert_eq!(parsed.finish_reason, FinishReason::ToolCalls);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "get_weather");
        assert_eq!(parsed.tool_calls[0].arguments["city"], "Oslo");
    }

    #[test]
    fn parse_empty_choices_is_invalid() {
        let response = ChatCompletionResponse {
            model: "m".to_string(),
            choices: vec![],
            usage: None,
        };
        assert!(matches!(
            parse_response(response),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn assembler_joins_fragmented_tool_calls() {
        let mut assembler = ToolCallAssembler::new();
        assembler.absorb(vec![StreamToolCallDelta {
            index: 0,
            id: Some("call_9".to_string()),
            function: Some(StreamFunctionDelta {
                name: Some("search".to_string()),
                arguments: Some("{\"qu".to_string()),
            }),
        }]);
        assembler.absorb(vec![StreamToolCallDelta {
            index: 0,
            id: None,
            function: Some(StreamFunctionDelta {
                name: None,
                arguments: Some("ery\": \"rust\"}".to_string()),
            }),
        }]);

        let calls = assembler.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments["query"], "rust");
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_calls() {
        let token = CancelToken::new();
        token.cancel();
        let client = test_client().with_cancel(token);

        let err = client
            .guarded(std::future::pending::<LlmResult<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(status_error(429, String::new()), LlmError::RateLimited));
        assert!(matches!(
            status_error(500, String::new()),
            LlmError::Upstream { status: 500, .. }
        ));
        assert!(matches!(
            status_error(404, String::new()),
            LlmError::Upstream { status: 404, .. }
        ));
    }
}

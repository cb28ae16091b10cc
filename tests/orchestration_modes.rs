//! Multi-agent orchestration driven end to end with a scripted LLM.

use async_trait::async_trait;
use hivekit::agent::{
    Agent, AgentConfig, ChatAgent, DebateJudge, Planner, ReactAgent, ReactStatus,
};
use hivekit::llm::{
    ChatMessage, ChatOptions, ChatStream, FinishReason, LlmClient, LlmResponse, LlmResult,
    StreamDelta, TokenUsage,
};
use hivekit::orchestration::{
    ConsensusConfig, DebateConfig, OrchestrationMode, Orchestrator, TaskStatus,
};
use hivekit::tools::{
    ParameterKind, Tool, ToolCategory, ToolParameter, ToolRegistry, ToolResult, ToolSchema,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replays a fixed script of responses, repeating the final entry.
struct ScriptedLlm {
    responses: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, _messages: &[ChatMessage], _opts: &ChatOptions) -> LlmResult<LlmResponse> {
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
        Ok(Box::pin(futures_util::stream::iter(vec![
            Ok(StreamDelta::Content(response.content)),
            Ok(StreamDelta::Done {
                finish_reason: FinishReason::Stop,
                tool_calls: vec![],
            }),
        ])))
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

struct WordCounter {
    schema: ToolSchema,
}

impl WordCounter {
    fn new() -> Self {
        Self {
            schema: ToolSchema::new("word_count", "Count words in text", ToolCategory::Data)
                .with_parameter(ToolParameter::new(
                    "text",
                    ParameterKind::String,
                    "Text to count",
                )),
        }
    }
}

#[async_trait]
impl Tool for WordCounter {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<ToolResult> {
        let words = args["text"]
            .as_str()
            .unwrap_or_default()
            .split_whitespace()
            .count();
        Ok(ToolResult::ok(json!(words)))
    }
}

fn chat_agent(name: &str, responses: Vec<&str>) -> Arc<dyn Agent> {
    Arc::new(ChatAgent::new(
        AgentConfig::new(name, "participant").with_memory(false),
        Arc::new(ScriptedLlm::new(responses)),
    ))
}

#[tokio::test]
async fn react_agent_uses_tools_inside_orchestration() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(WordCounter::new())).unwrap();

    let llm = Arc::new(ScriptedLlm::new(vec![
        "Thought: count the words first\nAction: word_count({\"text\": \"one two three\"})",
        "Final Answer: the text has 3 words",
    ]));
    let react = ReactAgent::new(llm, registry);

    let outcome = react.run("how many words in 'one two three'?").await.unwrap();
    assert_eq!(outcome.status, ReactStatus::Completed);
    assert_eq!(outcome.answer, "the text has 3 words");
    assert_eq!(outcome.steps[0].observation.as_deref(), Some("3"));
}

#[tokio::test]
async fn planner_feeds_sequential_pipeline() {
    let planner: Arc<dyn Agent> = Arc::new(Planner::new(Arc::new(ScriptedLlm::new(vec![
        r#"```json
{"steps": [{"description": "survey the site", "expected_output": "site report"}],
 "resources": ["drone"], "estimated_cost": "one day"}
```"#,
    ]))));
    let executor = chat_agent("executor", vec!["surveyed the site as planned"]);

    let mut orchestrator = Orchestrator::new(Arc::new(ScriptedLlm::new(vec!["unused"])));
    orchestrator.register_agent(planner).unwrap();
    orchestrator.register_agent(executor).unwrap();

    let result = orchestrator
        .execute("map the area", OrchestrationMode::Sequential)
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.agent_outputs.len(), 2);
    // The planner's structured plan is threaded into the second agent.
    let plan: Value = serde_json::from_str(&result.agent_outputs[0].output).unwrap();
    assert_eq!(plan["steps"][0]["description"], "survey the site");
    assert_eq!(result.agent_outputs[1].output, "surveyed the site as planned");
}

#[tokio::test]
async fn debate_mode_end_to_end() {
    let judge = DebateJudge::new(Arc::new(ScriptedLlm::new(vec![
        "Decision: CONTINUE\nConfidence: 0.9\nReason: positions still apart",
        "Decision: CONSENSUS\nConfidence: 0.85\nReason: both sides converged",
    ])));
    let summarizer = Arc::new(ScriptedLlm::new(vec!["they agreed in round two"]));

    let mut orchestrator = Orchestrator::new(summarizer).with_judge(judge);
    orchestrator
        .register_agent(chat_agent("north", vec!["we should expand", "expansion with care"]))
        .unwrap();
    orchestrator
        .register_agent(chat_agent("south", vec!["expansion is risky", "careful expansion works"]))
        .unwrap();

    let config = DebateConfig {
        max_rounds: 5,
        ..DebateConfig::default()
    };
    let result = orchestrator.run_debate("expand the fleet?", &config).await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.output["rounds_used"], 2);
    assert_eq!(result.output["terminated_early"], true);
    assert_eq!(result.output["summary"], "they agreed in round two");
    assert_eq!(result.output["transcript"].as_array().unwrap().len(), 4);

    // Debate turns were broadcast over the bus.
    assert!(!orchestrator.bus().debate_history().is_empty());
}

#[tokio::test]
async fn vote_mode_majority_and_rationales() {
    let mut orchestrator = Orchestrator::new(Arc::new(ScriptedLlm::new(vec!["unused"])));
    orchestrator
        .register_agent(chat_agent("a", vec!["Choice: rust\nRationale: fearless"]))
        .unwrap();
    orchestrator
        .register_agent(chat_agent("b", vec!["Choice: go\nRationale: simple"]))
        .unwrap();
    orchestrator
        .register_agent(chat_agent("c", vec!["Choice: rust\nRationale: fast"]))
        .unwrap();

    let options = vec!["rust".to_string(), "go".to_string()];
    let result = orchestrator
        .execute("pick a language", OrchestrationMode::Vote(options))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.output["winner"], "rust");
    let tally = result.output["tally"].as_array().unwrap();
    assert_eq!(tally[0]["option"], "rust");
    assert_eq!(tally[0]["votes"], 2);
}

#[tokio::test]
async fn consensus_mode_converges() {
    let judge = DebateJudge::new(Arc::new(ScriptedLlm::new(vec![
        "Largest group: 1",
        "Largest group: 2",
    ])));
    let mut orchestrator =
        Orchestrator::new(Arc::new(ScriptedLlm::new(vec!["unused"]))).with_judge(judge);
    orchestrator
        .register_agent(chat_agent("a", vec!["plan alpha", "plan beta is fine"]))
        .unwrap();
    orchestrator
        .register_agent(chat_agent("b", vec!["plan beta", "plan beta"]))
        .unwrap();

    let config = ConsensusConfig {
        max_rounds: 3,
        threshold: 0.9,
    };
    let result = orchestrator.run_consensus("which plan?", &config).await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.output["reached"], true);
    assert_eq!(result.output["rounds_used"], 2);
}

#[tokio::test]
async fn parallel_mode_collects_every_agent() {
    let mut orchestrator = Orchestrator::new(Arc::new(ScriptedLlm::new(vec!["unused"])));
    for (name, answer) in [("alpha", "from alpha"), ("beta", "from beta")] {
        orchestrator
            .register_agent(chat_agent(name, vec![answer]))
            .unwrap();
    }

    let result = orchestrator
        .execute("report in", OrchestrationMode::Parallel)
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    let outputs: Vec<&str> = result
        .agent_outputs
        .iter()
        .map(|o| o.output.as_str())
        .collect();
    assert_eq!(outputs, vec!["from alpha", "from beta"]);
}

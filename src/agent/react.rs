//! ReAct strategy: bounded alternation of reasoning and acting.

use super::parser::{self, ReactDirective};
use super::{Agent, AgentConfig, AgentResult, BaseAgent};
use crate::bus::Message;
use crate::llm::{ChatMessage, LlmClient};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// How a ReAct run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactStatus {
    /// The model produced a final answer.
    Completed,
    /// The iteration budget ran out; the answer is best-effort.
    Truncated,
}

/// A tool invocation recorded in the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tool: String,
    pub args: Map<String, Value>,
}

/// One turn of the reason/act loop.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReactStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

/// Result of a ReAct run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactOutcome {
    pub answer: String,
    pub status: ReactStatus,
    pub steps: Vec<ReactStep>,
}

/// Agent that alternates thought, action, and observation up to a bounded
/// iteration count.
pub struct ReactAgent {
    base: BaseAgent,
}

impl ReactAgent {
    /// Create a ReAct agent with tools.
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        let config = AgentConfig::new("react", "reasoning agent")
            .with_description("Solves tasks by alternating reasoning with tool use.");
        Self::with_config(config, llm, Some(tools))
    }

    /// Create a ReAct agent with an explicit configuration.
    pub fn with_config(
        config: AgentConfig,
        llm: Arc<dyn LlmClient>,
        tools: Option<ToolRegistry>,
    ) -> Self {
        let base = BaseAgent::new(config, llm);
        let base = match tools {
            Some(tools) => base.with_tools(tools),
            None => base,
        };
        Self { base }
    }

    /// Access the underlying base agent.
    pub fn base(&self) -> &BaseAgent {
        &self.base
    }

    fn react_system_prompt(&self) -> String {
        let tool_lines = match self.base.tools() {
            Some(registry) => registry
                .to_function_schemas(None)
                .iter()
                .map(|schema| {
                    format!(
                        "- {}: {}",
                        schema["function"]["name"].as_str().unwrap_or_default(),
                        schema["function"]["description"].as_str().unwrap_or_default()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            None => "(no tools available)".to_string(),
        };

        format!(
            "You solve tasks step by step using the ReAct pattern.\n\n\
             Available tools:\n{}\n\n\
             Respond with exactly one of:\n\
             Thought: <your reasoning>\n\
             Action: <tool_name>(<arguments as JSON or key=value pairs>)\n\
             Final Answer: <the answer to the task>\n\n\
             After an Action you will receive an Observation with the tool \
             result. Finish with a Final Answer as soon as you can.",
            tool_lines
        )
    }

    /// Run the reason/act loop on a task.
    pub async fn run(&self, task: &str) -> AgentResult<ReactOutcome> {
        let mut messages = vec![
            ChatMessage::system(self.react_system_prompt()),
            ChatMessage::user(task),
        ];
        let mut steps: Vec<ReactStep> = Vec::new();
        let mut last_assistant = String::new();
        let opts = self.base.chat_opts();

        for iteration in 0..self.base.config().max_iterations {
            let response = self.base.llm().chat(&messages, &opts).await?;
            let content = response.content;
            last_assistant = content.clone();
            messages.push(ChatMessage::assistant(content.clone()));

            match parser::parse_react_turn(&content) {
                ReactDirective::FinalAnswer(answer) => {
                    tracing::debug!(agent = %self.base.name(), iteration, "final answer");
                    return Ok(ReactOutcome {
                        answer,
                        status: ReactStatus::Completed,
                        steps,
                    });
                }
                ReactDirective::Action { tool, args } => {
                    let thought = parser::extract_thought(&content);
                    let observation = self.dispatch(&tool, args.clone()).await;
                    tracing::debug!(
                        agent = %self.base.name(),
                        iteration,
                        tool = %tool,
                        "action dispatched"
                    );

                    steps.push(ReactStep {
                        thought,
                        action: Some(ActionRecord { tool, args }),
                        observation: Some(observation.clone()),
                    });
                    messages.push(ChatMessage::user(format!("Observation: {}", observation)));
                }
                ReactDirective::Thought(thought) => {
                    steps.push(ReactStep {
                        thought: Some(thought),
                        ..ReactStep::default()
                    });
                    messages.push(ChatMessage::user(
                        "Continue. Take an action or give a final answer.",
                    ));
                }
                ReactDirective::Raw(text) => {
                    // No recognisable pattern: the raw text is the answer.
                    return Ok(ReactOutcome {
                        answer: text,
                        status: ReactStatus::Completed,
                        steps,
                    });
                }
            }
        }

        tracing::warn!(
            agent = %self.base.name(),
            budget = self.base.config().max_iterations,
            "iteration budget exhausted"
        );
        Ok(ReactOutcome {
            answer: last_assistant,
            status: ReactStatus::Truncated,
            steps,
        })
    }

    async fn dispatch(&self, tool: &str, args: Map<String, Value>) -> String {
        let Some(registry) = self.base.tools() else {
            return "error: no tool registry attached".to_string();
        };

        let result = registry.execute(tool, args).await;
        if result.success {
            serde_json::to_string(&result.data).unwrap_or_else(|_| "null".to_string())
        } else {
            format!(
                "error: {}",
                result.error.unwrap_or_else(|| "unknown failure".to_string())
            )
        }
    }
}

#[async_trait]
impl Agent for ReactAgent {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    async fn handle(&self, message: Message) -> Message {
        match self.run(&message.payload.content).await {
            Ok(outcome) => message.reply(outcome.answer),
            Err(err) => message.error_reply(format!("processing failed: {}", err)),
        }
    }

    async fn execute(&self, task: &str) -> AgentResult<String> {
        Ok(self.run(task).await?.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::ScriptedLlm;
    use super::*;
    use crate::tools::{
        ParameterKind, Tool, ToolCategory, ToolParameter, ToolResult, ToolSchema,
    };
    use serde_json::json;

    struct AddTool {
        schema: ToolSchema,
    }

    impl AddTool {
        fn new() -> Self {
            Self {
                schema: ToolSchema::new("add", "Add two numbers", ToolCategory::Computation)
                    .with_parameter(ToolParameter::new("x", ParameterKind::Number, "left"))
                    .with_parameter(ToolParameter::new("y", ParameterKind::Number, "right")),
            }
        }
    }

    #[async_trait]
    impl Tool for AddTool {
        fn schema(&self) -> &ToolSchema {
            &self.schema
        }

        async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<ToolResult> {
            let x = args["x"].as_f64().unwrap_or_default();
            let y = args["y"].as_f64().unwrap_or_default();
            Ok(ToolResult::ok(json!(x + y)))
        }
    }

    fn registry_with_add() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(AddTool::new())).unwrap();
        registry
    }

    #[tokio::test]
    async fn direct_final_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec!["Final Answer: it is 4"]));
        let agent = ReactAgent::new(llm, registry_with_add());

        let outcome = agent.run("what is 2+2?").await.unwrap();
        assert_eq!(outcome.status, ReactStatus::Completed);
        assert_eq!(outcome.answer, "it is 4");
        assert!(outcome.steps.is_empty());
    }

    #[tokio::test]
    async fn action_then_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "Thought: I should add these\nAction: add({\"x\": 2, \"y\": 3})",
            "Final Answer: the sum is 5",
        ]));
        let agent = ReactAgent::new(llm, registry_with_add());

        let outcome = agent.run("add 2 and 3").await.unwrap();
        assert_eq!(outcome.status, ReactStatus::Completed);
        assert_eq!(outcome.answer, "the sum is 5");
        assert_eq!(outcome.steps.len(), 1);

        let step = &outcome.steps[0];
        assert_eq!(step.thought.as_deref(), Some("I should add these"));
        assert_eq!(step.action.as_ref().unwrap().tool, "add");
        assert_eq!(step.observation.as_deref(), Some("5.0"));
    }

    #[tokio::test]
    async fn failed_tool_becomes_observation() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "Action: add({\"x\": 2})",
            "Final Answer: could not compute",
        ]));
        let agent = ReactAgent::new(llm, registry_with_add());

        let outcome = agent.run("add").await.unwrap();
        let observation = outcome.steps[0].observation.as_deref().unwrap();
        assert!(observation.contains("missing required parameter: y"));
        assert_eq!(outcome.status, ReactStatus::Completed);
    }

    #[tokio::test]
    async fn unrecognised_output_is_the_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec!["Paris is the capital of France."]));
        let agent = ReactAgent::new(llm, registry_with_add());

        let outcome = agent.run("capital of France?").await.unwrap();
        assert_eq!(outcome.status, ReactStatus::Completed);
        assert_eq!(outcome.answer, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn budget_exhaustion_truncates() {
        let config = AgentConfig::new("react", "r").with_max_iterations(2);
        let llm = Arc::new(ScriptedLlm::new(vec![
            "Thought: hmm",
            "Thought: still thinking",
        ]));
        let agent = ReactAgent::with_config(config, llm.clone(), Some(registry_with_add()));

        let outcome = agent.run("hard question").await.unwrap();
        assert_eq!(outcome.status, ReactStatus::Truncated);
        assert_eq!(outcome.answer, "Thought: still thinking");
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn missing_registry_reports_in_observation() {
        let config = AgentConfig::new("react", "r");
        let llm = Arc::new(ScriptedLlm::new(vec![
            "Action: add({\"x\": 1, \"y\": 2})",
            "Final Answer: no tools",
        ]));
        let agent = ReactAgent::with_config(config, llm, None);

        let outcome = agent.run("add").await.unwrap();
        assert!(outcome.steps[0]
            .observation
            .as_deref()
            .unwrap()
            .contains("no tool registry"));
    }
}

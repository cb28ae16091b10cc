//! One-shot planning strategy.
//!
//! Given a goal, the planner asks the LLM for a structured plan and parses
//! it leniently: fenced JSON is preferred, numbered or bulleted step lists
//! are tolerated, and in the worst case the whole response becomes a
//! single-step plan.

use super::parser;
use super::{Agent, AgentConfig, AgentError, AgentResult, BaseAgent};
use crate::bus::Message;
use crate::llm::LlmClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// One step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub description: String,
    #[serde(default)]
    pub expected_output: String,
}

/// A structured execution plan.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub estimated_cost: String,
}

/// Single-shot planning agent.
pub struct Planner {
    base: BaseAgent,
}

impl Planner {
    /// Create a planner with its default configuration.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let config = AgentConfig::new("planner", "task planner")
            .with_description(
                "Breaks a goal into ordered, executable steps with required resources and a cost estimate.",
            )
            .with_temperature(0.5);
        Self::with_config(config, llm)
    }

    /// Create a planner with an explicit configuration.
    pub fn with_config(config: AgentConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            base: BaseAgent::new(config, llm),
        }
    }

    /// Access the underlying base agent.
    pub fn base(&self) -> &BaseAgent {
        &self.base
    }

    /// Produce a structured plan for a goal.
    pub async fn plan(&self, goal: &str) -> AgentResult<Plan> {
        let prompt = format!(
            "Create an execution plan for the following goal.\n\n\
             Goal: {}\n\n\
             Respond with a JSON object in a fenced code block:\n\
             ```json\n\
             {{\n\
               \"steps\": [{{\"description\": \"...\", \"expected_output\": \"...\"}}],\n\
               \"resources\": [\"...\"],\n\
               \"estimated_cost\": \"...\"\n\
             }}\n\
             ```\n\
             Keep steps ordered and concrete.",
            goal
        );

        let response = self.base.chat_detached(&prompt).await?;
        Ok(parse_plan(&response))
    }

    /// Free-form task analysis: objective, steps, resources, risks.
    pub async fn analyze(&self, task: &str) -> AgentResult<String> {
        let prompt = format!(
            "Analyze the following task. Cover: the objective, 3-5 main \
             steps, required resources or tools, and potential challenges.\n\n\
             Task: {}",
            task
        );
        self.base.chat_detached(&prompt).await
    }
}

/// Parse a plan from free-form output.
///
/// JSON (possibly fenced) is preferred; otherwise numbered or bulleted
/// lines become steps and labeled `Resources:` / `Estimated cost:` lines
/// are picked up. A response with no recognisable structure becomes a
/// one-step plan.
pub fn parse_plan(text: &str) -> Plan {
    if let Some(value) = parser::extract_json(text) {
        if let Ok(plan) = serde_json::from_value::<Plan>(value.clone()) {
            if !plan.steps.is_empty() {
                return plan;
            }
        }
        // Tolerate steps given as plain strings.
        if let Some(steps) = value.get("steps").and_then(Value::as_array) {
            let steps: Vec<PlanStep> = steps
                .iter()
                .filter_map(|s| match s {
                    Value::String(text) => Some(PlanStep {
                        description: text.clone(),
                        expected_output: String::new(),
                    }),
                    Value::Object(obj) => Some(PlanStep {
                        description: obj
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        expected_output: obj
                            .get("expected_output")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    }),
                    _ => None,
                })
                .collect();
            if !steps.is_empty() {
                return Plan {
                    steps,
                    resources: string_list(value.get("resources")),
                    estimated_cost: value
                        .get("estimated_cost")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                };
            }
        }
    }

    let steps = parse_listed_steps(text);
    if !steps.is_empty() {
        return Plan {
            steps,
            resources: parser::extract_labeled_line(text, "resources")
                .map(|line| {
                    line.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            estimated_cost: parser::extract_labeled_line(text, "estimated cost")
                .unwrap_or_default(),
        };
    }

    Plan {
        steps: vec![PlanStep {
            description: text.trim().to_string(),
            expected_output: String::new(),
        }],
        resources: Vec::new(),
        estimated_cost: String::new(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_listed_steps(text: &str) -> Vec<PlanStep> {
    let mut steps = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        let body = trimmed
            .strip_prefix(|c: char| c.is_ascii_digit())
            .map(|rest| rest.trim_start_matches(|c: char| c.is_ascii_digit()))
            .and_then(|rest| rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')))
            .or_else(|| trimmed.strip_prefix("- "))
            .or_else(|| trimmed.strip_prefix("* "));

        if let Some(body) = body {
            let body = body.trim();
            if !body.is_empty() {
                steps.push(PlanStep {
                    description: body.to_string(),
                    expected_output: String::new(),
                });
            }
        }
    }
    steps
}

#[async_trait]
impl Agent for Planner {
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
        let plan = self.plan(task).await?;
        serde_json::to_string_pretty(&plan).map_err(|e| AgentError::Parse(e.to_string()))
    }
}

//! Debate arbitration.
//!
//! A ReAct-style judge that reads a debate transcript and decides whether
//! the discussion should terminate, plus helpers the orchestrator uses for
//! consensus measurement.

use super::parser;
use super::{Agent, AgentConfig, AgentResult, BaseAgent};
use crate::bus::Message;
use crate::llm::LlmClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// One turn of a debate transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateTurn {
    pub agent: String,
    pub content: String,
}

impl DebateTurn {
    /// Create a turn.
    pub fn new(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            content: content.into(),
        }
    }
}

/// Judge decision on a debate round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JudgeDecision {
    Consensus,
    Sufficient,
    Divergence,
    Continue,
    Timeout,
}

impl JudgeDecision {
    /// Find the first decision token in free-form text.
    pub fn scan(text: &str) -> Option<Self> {
        let upper = text.to_uppercase();
        // Order matters: CONTINUE appears in phrases like "continue the
        // debate", so specific verdicts are checked first.
        for (token, decision) in [
            ("CONSENSUS", JudgeDecision::Consensus),
            ("SUFFICIENT", JudgeDecision::Sufficient),
            ("DIVERGENCE", JudgeDecision::Divergence),
            ("TIMEOUT", JudgeDecision::Timeout),
            ("CONTINUE", JudgeDecision::Continue),
        ] {
            if upper.contains(token) {
                return Some(decision);
            }
        }
        None
    }
}

/// Structured judgment over a debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub decision: JudgeDecision,
    pub confidence: f64,
    pub reason: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// ReAct judge consulted by the orchestrator after each debate round.
pub struct DebateJudge {
    base: BaseAgent,
}

impl DebateJudge {
    /// Create a judge with its default configuration.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let config = AgentConfig::new("debate-judge", "debate arbiter")
            .with_description(
                "Monitors multi-agent debates, assesses consensus, and decides when discussion should stop.",
            )
            .with_temperature(0.3);
        Self::with_config(config, llm)
    }

    /// Create a judge with an explicit configuration.
    pub fn with_config(config: AgentConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            base: BaseAgent::new(config, llm),
        }
    }

    fn format_transcript(turns: &[DebateTurn]) -> String {
        turns
            .iter()
            .enumerate()
            .map(|(i, turn)| format!("[turn {}] {}: {}", i + 1, turn.agent, turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Judge the state of a debate.
    pub async fn judge(
        &self,
        turns: &[DebateTurn],
        current_round: u32,
        max_rounds: u32,
    ) -> AgentResult<Judgment> {
        let participants: std::collections::BTreeSet<&str> =
            turns.iter().map(|t| t.agent.as_str()).collect();

        let prompt = format!(
            "Analyze this debate using the ReAct pattern and decide whether \
             it should terminate.\n\n\
             Round: {}/{}\n\
             Participants: {}\n\
             Statements: {}\n\n\
             Transcript:\n{}\n\n\
             Respond in this format:\n\
             Thought: <analysis of convergence and depth>\n\
             Observation: <key agreements and disagreements>\n\
             Decision: <one of CONSENSUS, SUFFICIENT, DIVERGENCE, CONTINUE, TIMEOUT>\n\
             Confidence: <number between 0.0 and 1.0>\n\
             Reason: <why>\n\
             Suggestions: <suggestion | suggestion>",
            current_round,
            max_rounds,
            participants.len(),
            turns.len(),
            Self::format_transcript(turns),
        );

        let response = self.base.chat_detached(&prompt).await?;
        let judgment = parse_judgment(&response);

        tracing::info!(
            decision = ?judgment.decision,
            confidence = judgment.confidence,
            round = current_round,
            "debate judged"
        );
        Ok(judgment)
    }

    /// Whether the debate should stop, with the judgment that decided it.
    pub async fn should_terminate(
        &self,
        turns: &[DebateTurn],
        current_round: u32,
        max_rounds: u32,
        min_confidence: f64,
    ) -> AgentResult<(bool, Judgment)> {
        let judgment = self.judge(turns, current_round, max_rounds).await?;
        let stop =
            judgment.decision != JudgeDecision::Continue && judgment.confidence >= min_confidence;
        Ok((stop, judgment))
    }

    /// Free-form consensus analysis of a transcript.
    pub async fn analyze_consensus(&self, turns: &[DebateTurn]) -> AgentResult<String> {
        let prompt = format!(
            "Analyze the degree of consensus in this debate. List the \
             points of agreement, the points of contention, a consensus \
             score from 0 to 10, and a summary of the main positions.\n\n{}",
            Self::format_transcript(turns),
        );
        self.base.chat_detached(&prompt).await
    }

    /// Size of the largest group of semantically equivalent positions, as
    /// a fraction of all positions.
    ///
    /// Used by the consensus orchestration mode; equivalence is judged by
    /// the model, not by string comparison.
    pub async fn largest_agreement(&self, positions: &[DebateTurn]) -> AgentResult<f64> {
        if positions.is_empty() {
            return Ok(0.0);
        }
        if positions.len() == 1 {
            return Ok(1.0);
        }

        let prompt = format!(
            "Group the following positions by semantic equivalence: two \
             positions belong together when they propose the same thing, \
             regardless of wording.\n\n{}\n\n\
             Respond with a single line:\n\
             Largest group: <count>",
            Self::format_transcript(positions),
        );

        let response = self.base.chat_detached(&prompt).await?;
        let count = parser::extract_labeled_line(&response, "largest group")
            .and_then(|line| {
                line.split(|c: char| !c.is_ascii_digit())
                    .find(|s| !s.is_empty())
                    .and_then(|s| s.parse::<usize>().ok())
            })
            .unwrap_or(1)
            .clamp(1, positions.len());

        Ok(count as f64 / positions.len() as f64)
    }
}

/// Parse a judgment from free-form output.
///
/// A JSON object with `decision`/`confidence` keys is preferred; labeled
/// lines are the fallback. Unparseable output yields CONTINUE at 0.5.
pub fn parse_judgment(text: &str) -> Judgment {
    if let Some(value) = parser::extract_json(text) {
        if let Some(obj) = value.as_object() {
            if let Some(decision) = obj
                .get("decision")
                .and_then(Value::as_str)
                .and_then(JudgeDecision::scan)
            {
                return Judgment {
                    decision,
                    confidence: obj
                        .get("confidence")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.5)
                        .clamp(0.0, 1.0),
                    reason: obj
                        .get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    suggestions: obj
                        .get("suggestions")
                        .and_then(Value::as_array)
                        .map(|a| {
                            a.iter()
                                .filter_map(Value::as_str)
                                .map(String::from)
                                .collect()
                        })
                        .unwrap_or_default(),
                };
            }
        }
    }

    let decision = parser::extract_labeled_line(text, "decision")
        .or_else(|| parser::extract_labeled_line(text, "status"))
        .and_then(|line| JudgeDecision::scan(&line))
        .or_else(|| JudgeDecision::scan(text))
        .unwrap_or(JudgeDecision::Continue);

    let confidence = parser::extract_confidence(text).unwrap_or(0.5);
    let reason = parser::extract_labeled_line(text, "reason").unwrap_or_default();
    let suggestions = parser::extract_labeled_line(text, "suggestions")
        .map(|line| {
            line.split('|')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Judgment {
        decision,
        confidence,
        reason,
        suggestions,
    }
}

#[async_trait]
impl Agent for DebateJudge {
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
        self.base.chat_detached(task).await
    }
}

//! Multi-agent coordination.
//!
//! The orchestrator owns the bus and a roster of agents and composes them
//! under five patterns: sequential, parallel, debate, vote, and consensus.
//! Every run produces a [`TaskResult`]; agent failures are folded into the
//! result rather than raised.

use crate::agent::{parser, Agent, DebateJudge, DebateTurn, Judgment, JudgeDecision};
use crate::bus::{BusResult, Message, MessageBus, MessageKind};
use crate::cancel::CancelToken;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Status of an orchestrated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

/// One agent's contribution to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent: String,
    pub output: String,
}

/// Result of an orchestrated task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub agent_outputs: Vec<AgentOutput>,
}

impl TaskResult {
    /// Whether the task completed.
    pub fn success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Wall-clock duration of the task.
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Parameters for debate mode.
#[derive(Debug, Clone)]
pub struct DebateConfig {
    /// Maximum debate rounds.
    pub max_rounds: u32,
    /// Judge confidence needed for an early stop.
    pub min_confidence: f64,
    /// Transcript turns shown to each speaker.
    pub transcript_window: usize,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            min_confidence: 0.7,
            transcript_window: 6,
        }
    }
}

/// Parameters for consensus mode.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Maximum polling rounds.
    pub max_rounds: u32,
    /// Fraction of agents that must agree.
    pub threshold: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            threshold: 0.66,
        }
    }
}

/// Coordination pattern selector.
#[derive(Debug, Clone)]
pub enum OrchestrationMode {
    Sequential,
    Parallel,
    Debate(DebateConfig),
    Vote(Vec<String>),
    Consensus(ConsensusConfig),
}

/// Coordinates a roster of agents over the message bus.
pub struct Orchestrator {
    bus: MessageBus,
    agents: Vec<Arc<dyn Agent>>,
    llm: Arc<dyn LlmClient>,
    judge: DebateJudge,
    cancel: CancelToken,
}

impl Orchestrator {
    /// Create an orchestrator; the judge shares the given LLM.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            bus: MessageBus::new(),
            agents: Vec::new(),
            judge: DebateJudge::new(llm.clone()),
            llm,
            cancel: CancelToken::new(),
        }
    }

    /// Replace the default judge.
    pub fn with_judge(mut self, judge: DebateJudge) -> Self {
        self.judge = judge;
        self
    }

    /// Replace the default bus.
    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = bus;
        self
    }

    /// Add an agent to the roster and register it on the bus.
    pub fn register_agent(&mut self, agent: Arc<dyn Agent>) -> BusResult<()> {
        self.bus.register(agent.id())?;
        tracing::info!(agent = %agent.name(), "agent registered with orchestrator");
        self.agents.push(agent);
        Ok(())
    }

    /// Remove an agent from the roster and the bus.
    pub fn unregister_agent(&mut self, agent_id: &str) -> BusResult<()> {
        self.bus.unregister(agent_id)?;
        self.agents.retain(|a| a.id() != agent_id);
        Ok(())
    }

    /// The bus.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Roster size.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Cancellation token observed between turns.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run a task under the given mode.
    pub async fn execute(&self, task: &str, mode: OrchestrationMode) -> TaskResult {
        match mode {
            OrchestrationMode::Sequential => self.run_sequential(task).await,
            OrchestrationMode::Parallel => self.run_parallel(task).await,
            OrchestrationMode::Debate(config) => self.run_debate(task, &config).await,
            OrchestrationMode::Vote(options) => self.run_vote(task, &options).await,
            OrchestrationMode::Consensus(config) => self.run_consensus(task, &config).await,
        }
    }

    /// Run agents in order, each receiving the previous agent's output.
    pub async fn run_sequential(&self, task: &str) -> TaskResult {
        let started_at = Utc::now();
        let mut outputs: Vec<AgentOutput> = Vec::new();
        let mut current = task.to_string();

        for agent in &self.agents {
            if self.cancel.is_cancelled() {
                return self.finish(
                    TaskStatus::Cancelled,
                    json!(outputs),
                    Some("task cancelled".to_string()),
                    started_at,
                    outputs.clone(),
                );
            }

            match agent.execute(&current).await {
                Ok(output) => {
                    current = format!(
                        "{}\n\nOutput from {}:\n{}",
                        task,
                        agent.name(),
                        output
                    );
                    outputs.push(AgentOutput {
                        agent: agent.name().to_string(),
                        output,
                    });
                }
                Err(e) => {
                    return self.finish(
                        TaskStatus::Failed,
                        json!(outputs),
                        Some(format!("agent '{}' failed: {}", agent.name(), e)),
                        started_at,
                        outputs.clone(),
                    );
                }
            }
        }

        self.finish(TaskStatus::Completed, json!(outputs), None, started_at, outputs)
    }

    /// Dispatch the same task to every agent concurrently.
    pub async fn run_parallel(&self, task: &str) -> TaskResult {
        let started_at = Utc::now();

        let futures = self.agents.iter().map(|agent| {
            let agent = agent.clone();
            let task = task.to_string();
            async move {
                let output = agent.execute(&task).await;
                (agent.name().to_string(), output)
            }
        });
        let results = futures_util::future::join_all(futures).await;

        let mut outputs = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (agent, output) in results {
            match output {
                Ok(output) => outputs.push(AgentOutput { agent, output }),
                Err(e) => {
                    failures.push(format!("{}: {}", agent, e));
                    outputs.push(AgentOutput {
                        agent,
                        output: format!("(error: {})", e),
                    });
                }
            }
        }

        let status = if failures.len() == self.agents.len() && !self.agents.is_empty() {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };
        let error = if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        };

        self.finish(status, json!(outputs), error, started_at, outputs)
    }

    /// Debate: round-robin turns with judge-driven early termination.
    ///
    /// The debate stops early when the judge returns CONSENSUS or
    /// DIVERGENCE at or above the configured confidence; exhausting the
    /// round budget yields a TIMEOUT judgment.
    pub async fn run_debate(&self, topic: &str, config: &DebateConfig) -> TaskResult {
        let started_at = Utc::now();
        let mut transcript: Vec<DebateTurn> = Vec::new();
        let mut judgment: Option<Judgment> = None;
        let mut terminated_early = false;
        let mut rounds_used = 0;

        'rounds: for round in 1..=config.max_rounds {
            rounds_used = round;
            tracing::debug!(round, topic, "debate round started");

            for agent in &self.agents {
                if self.cancel.is_cancelled() {
                    let outputs = turns_to_outputs(&transcript);
                    return self.finish(
                        TaskStatus::Cancelled,
                        json!({"topic": topic, "transcript": transcript}),
                        Some("debate cancelled".to_string()),
                        started_at,
                        outputs,
                    );
                }

                let prompt = debate_prompt(topic, &transcript, config.transcript_window);
                let content = match agent.execute(&prompt).await {
                    Ok(content) => content,
                    Err(e) => format!("(error: {})", e),
                };

                // Turns are broadcast so bus observers see the debate live.
                self.bus
                    .broadcast(Message::new(MessageKind::DebateTurn, agent.id(), &content));
                transcript.push(DebateTurn::new(agent.name(), content));
            }

            match self
                .judge
                .should_terminate(&transcript, round, config.max_rounds, config.min_confidence)
                .await
            {
                Ok((_, j)) => {
                    let decisive = matches!(
                        j.decision,
                        JudgeDecision::Consensus | JudgeDecision::Divergence
                    ) && j.confidence >= config.min_confidence;
                    judgment = Some(j);
                    if decisive {
                        terminated_early = true;
                        break 'rounds;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "judge unavailable, continuing debate");
                }
            }
        }

        if !terminated_early {
            judgment = Some(Judgment {
                decision: JudgeDecision::Timeout,
                confidence: 1.0,
                reason: "round budget consumed".to_string(),
                suggestions: Vec::new(),
            });
        }

        let summary = self.summarize_debate(topic, &transcript).await;
        let outputs = turns_to_outputs(&transcript);

        self.finish(
            TaskStatus::Completed,
            json!({
                "topic": topic,
                "rounds_used": rounds_used,
                "terminated_early": terminated_early,
                "judgment": judgment,
                "transcript": transcript,
                "summary": summary,
            }),
            None,
            started_at,
            outputs,
        )
    }

    /// Vote: each agent picks one option; majority wins, ties broken by
    /// the first vote received.
    pub async fn run_vote(&self, task: &str, options: &[String]) -> TaskResult {
        let started_at = Utc::now();
        let mut votes: Vec<(String, String, String)> = Vec::new(); // agent, choice, rationale

        for agent in &self.agents {
            if self.cancel.is_cancelled() {
                return self.finish(
                    TaskStatus::Cancelled,
                    Value::Null,
                    Some("vote cancelled".to_string()),
                    started_at,
                    Vec::new(),
                );
            }

            let prompt = format!(
                "Decide on the following question and pick exactly one option.\n\n\
                 Question: {}\n\
                 Options: {}\n\n\
                 Respond in this format:\n\
                 Choice: <one option, verbatim>\n\
                 Rationale: <why>",
                task,
                options.join(", "),
            );

            match agent.execute(&prompt).await {
                Ok(response) => match parse_vote(&response, options) {
                    Some((choice, rationale)) => {
                        votes.push((agent.name().to_string(), choice, rationale));
                    }
                    None => {
                        tracing::warn!(agent = %agent.name(), "vote discarded: no option recognised");
                    }
                },
                Err(e) => {
                    tracing::warn!(agent = %agent.name(), error = %e, "vote discarded: agent failed");
                }
            }
        }

        if votes.is_empty() {
            return self.finish(
                TaskStatus::Failed,
                Value::Null,
                Some("no valid votes cast".to_string()),
                started_at,
                Vec::new(),
            );
        }

        // Tally in first-vote order so ties resolve to the earliest choice.
        let mut tally: Vec<(String, usize)> = Vec::new();
        for (_, choice, _) in &votes {
            match tally.iter_mut().find(|(c, _)| c == choice) {
                Some((_, count)) => *count += 1,
                None => tally.push((choice.clone(), 1)),
            }
        }
        let mut winner = String::new();
        let mut best = 0;
        for (choice, count) in &tally {
            if *count > best {
                best = *count;
                winner = choice.clone();
            }
        }

        let outputs: Vec<AgentOutput> = votes
            .iter()
            .map(|(agent, choice, _)| AgentOutput {
                agent: agent.clone(),
                output: choice.clone(),
            })
            .collect();

        self.finish(
            TaskStatus::Completed,
            json!({
                "winner": winner,
                "tally": tally.iter().map(|(c, n)| json!({"option": c, "votes": n})).collect::<Vec<_>>(),
                "votes": votes.iter().map(|(a, c, r)| json!({"agent": a, "choice": c, "rationale": r})).collect::<Vec<_>>(),
            }),
            None,
            started_at,
            outputs,
        )
    }

    /// Consensus: poll agents until a threshold fraction hold semantically
    /// equivalent positions, as judged by the debate judge.
    pub async fn run_consensus(&self, task: &str, config: &ConsensusConfig) -> TaskResult {
        let started_at = Utc::now();
        let mut positions: Vec<DebateTurn> = Vec::new();
        let mut fraction = 0.0;
        let mut reached = false;
        let mut rounds_used = 0;

        for round in 1..=config.max_rounds {
            rounds_used = round;

            let mut round_positions = Vec::with_capacity(self.agents.len());
            for agent in &self.agents {
                if self.cancel.is_cancelled() {
                    let outputs = turns_to_outputs(&positions);
                    return self.finish(
                        TaskStatus::Cancelled,
                        json!({"positions": positions}),
                        Some("consensus polling cancelled".to_string()),
                        started_at,
                        outputs,
                    );
                }

                let prompt = if positions.is_empty() {
                    format!("State your position on the following.\n\n{}", task)
                } else {
                    format!(
                        "State your position on the following, revising toward \
                         agreement where the other positions convince you.\n\n\
                         {}\n\nCurrent positions:\n{}",
                        task,
                        positions
                            .iter()
                            .map(|p| format!("- {}: {}", p.agent, p.content))
                            .collect::<Vec<_>>()
                            .join("\n"),
                    )
                };

                let content = match agent.execute(&prompt).await {
                    Ok(content) => content,
                    Err(e) => format!("(error: {})", e),
                };
                round_positions.push(DebateTurn::new(agent.name(), content));
            }
            positions = round_positions;

            fraction = match self.judge.largest_agreement(&positions).await {
                Ok(fraction) => fraction,
                Err(e) => {
                    tracing::warn!(error = %e, "agreement measurement failed");
                    0.0
                }
            };
            tracing::debug!(round, fraction, "consensus round measured");

            if fraction >= config.threshold {
                reached = true;
                break;
            }
        }

        let outputs = turns_to_outputs(&positions);
        self.finish(
            TaskStatus::Completed,
            json!({
                "reached": reached,
                "agreement": fraction,
                "rounds_used": rounds_used,
                "positions": positions,
            }),
            None,
            started_at,
            outputs,
        )
    }

    async fn summarize_debate(&self, topic: &str, transcript: &[DebateTurn]) -> String {
        let rendered = transcript
            .iter()
            .map(|t| format!("{}: {}", t.agent, t.content))
            .collect::<Vec<_>>()
            .join("\n");
        let messages = vec![
            ChatMessage::system("You summarize multi-agent debates concisely and neutrally."),
            ChatMessage::user(format!(
                "Topic: {}\n\nTranscript:\n{}\n\nSummarize the positions and the outcome.",
                topic, rendered
            )),
        ];

        match self.llm.chat(&messages, &ChatOptions::new()).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!(error = %e, "debate summary failed");
                String::new()
            }
        }
    }

    fn finish(
        &self,
        status: TaskStatus,
        output: Value,
        error: Option<String>,
        started_at: DateTime<Utc>,
        agent_outputs: Vec<AgentOutput>,
    ) -> TaskResult {
        TaskResult {
            task_id: Uuid::new_v4(),
            status,
            output,
            error,
            started_at,
            completed_at: Utc::now(),
            agent_outputs,
        }
    }
}

fn turns_to_outputs(turns: &[DebateTurn]) -> Vec<AgentOutput> {
    turns
        .iter()
        .map(|t| AgentOutput {
            agent: t.agent.clone(),
            output: t.content.clone(),
        })
        .collect()
}

fn debate_prompt(topic: &str, transcript: &[DebateTurn], window: usize) -> String {
    if transcript.is_empty() {
        return format!("Debate topic: {}\n\nState your opening position.", topic);
    }
    let start = transcript.len().saturating_sub(window);
    let recent = transcript[start..]
        .iter()
        .map(|t| format!("[{}]: {}", t.agent, t.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Debate topic: {}\n\nRecent statements:\n{}\n\nIt is your turn. Respond to the discussion.",
        topic, recent
    )
}

/// Extract `(choice, rationale)` from a vote response.
///
/// The labeled `Choice:` line is preferred; otherwise the first option
/// mentioned anywhere in the response wins. Responses naming no option
/// are discarded.
pub fn parse_vote(response: &str, options: &[String]) -> Option<(String, String)> {
    let rationale = parser::extract_labeled_line(response, "rationale").unwrap_or_default();

    if let Some(line) = parser::extract_labeled_line(response, "choice") {
        let lowered = line.to_lowercase();
        if let Some(option) = options
            .iter()
            .find(|o| lowered.contains(&o.to_lowercase()))
        {
            return Some((option.clone(), rationale));
        }
    }

    let lowered = response.to_lowercase();
    options
        .iter()
        .filter_map(|o| lowered.find(&o.to_lowercase()).map(|pos| (pos, o)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, option)| (option.clone(), rationale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::ScriptedLlm;
    use crate::agent::{AgentConfig, ChatAgent};

    fn scripted_agent(name: &str, responses: Vec<&str>) -> Arc<dyn Agent> {
        let config = AgentConfig::new(name, "test participant").with_memory(false);
        Arc::new(ChatAgent::new(config, Arc::new(ScriptedLlm::new(responses))))
    }

    fn orchestrator_with(
        judge_responses: Vec<&'static str>,
        agents: Vec<Arc<dyn Agent>>,
    ) -> Orchestrator {
        let llm = Arc::new(ScriptedLlm::new(vec!["summary of the discussion"]));
        let judge = DebateJudge::new(Arc::new(ScriptedLlm::new(judge_responses)));
        let mut orchestrator = Orchestrator::new(llm).with_judge(judge);
        for agent in agents {
            orchestrator.register_agent(agent).unwrap();
        }
        orchestrator
    }

    #[tokio::test]
    async fn sequential_chains_outputs() {
        let orchestrator = orchestrator_with(
            vec![],
            vec![
                scripted_agent("first", vec!["alpha"]),
                scripted_agent("second", vec!["beta"]),
            ],
        );

        let result = orchestrator.run_sequential("do the work").await;
        assert!(result.success());
        assert_eq!(result.agent_outputs.len(), 2);
        assert_eq!(result.agent_outputs[0].output, "alpha");
        assert_eq!(result.agent_outputs[1].output, "beta");
    }

    #[tokio::test]
    async fn parallel_collects_all_outputs() {
        let orchestrator = orchestrator_with(
            vec![],
            vec![
                scripted_agent("a", vec!["one"]),
                scripted_agent("b", vec!["two"]),
                scripted_agent("c", vec!["three"]),
            ],
        );

        let result = orchestrator.run_parallel("same task").await;
        assert!(result.success());
        assert_eq!(result.agent_outputs.len(), 3);
        let outputs: Vec<&str> = result
            .agent_outputs
            .iter()
            .map(|o| o.output.as_str())
            .collect();
        assert_eq!(outputs, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn debate_stops_early_on_confident_consensus() {
        let orchestrator = orchestrator_with(
            vec!["Decision: CONSENSUS\nConfidence: 0.9\nReason: aligned"],
            vec![
                scripted_agent("pro", vec!["I am in favor"]),
                scripted_agent("con", vec!["actually, I agree"]),
            ],
        );

        let result = orchestrator
            .run_debate("should we?", &DebateConfig::default())
            .await;
        assert!(result.success());
        assert_eq!(result.output["terminated_early"], true);
        assert_eq!(result.output["rounds_used"], 1);
        assert_eq!(result.output["judgment"]["decision"], "CONSENSUS");
        assert_eq!(result.output["summary"], "summary of the discussion");
    }

    #[tokio::test]
    async fn debate_round_exhaustion_is_timeout() {
        let orchestrator = orchestrator_with(
            vec!["Decision: CONTINUE\nConfidence: 0.9\nReason: still going"],
            vec![
                scripted_agent("pro", vec!["yes"]),
                scripted_agent("con", vec!["no"]),
            ],
        );

        let config = DebateConfig {
            max_rounds: 2,
            ..DebateConfig::default()
        };
        let result = orchestrator.run_debate("topic", &config).await;
        assert!(result.success());
        assert_eq!(result.output["terminated_early"], false);
        assert_eq!(result.output["judgment"]["decision"], "TIMEOUT");
        // Two agents times two rounds.
        assert_eq!(result.output["transcript"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn vote_majority_wins() {
        let options = vec!["apple".to_string(), "banana".to_string()];
        let orchestrator = orchestrator_with(
            vec![],
            vec![
                scripted_agent("a", vec!["Choice: apple\nRationale: crisp"]),
                scripted_agent("b", vec!["Choice: banana\nRationale: sweet"]),
                scripted_agent("c", vec!["Choice: apple\nRationale: classic"]),
            ],
        );

        let result = orchestrator.run_vote("pick a fruit", &options).await;
        assert!(result.success());
        assert_eq!(result.output["winner"], "apple");
    }

    #[tokio::test]
    async fn vote_tie_breaks_to_first_received() {
        let options = vec!["x".to_string(), "y".to_string()];
        let orchestrator = orchestrator_with(
            vec![],
            vec![
                scripted_agent("a", vec!["Choice: y"]),
                scripted_agent("b", vec!["Choice: x"]),
            ],
        );

        let result = orchestrator.run_vote("pick", &options).await;
        assert_eq!(result.output["winner"], "y");
    }

    #[tokio::test]
    async fn vote_with_no_valid_votes_fails() {
        let options = vec!["left".to_string(), "right".to_string()];
        let orchestrator = orchestrator_with(
            vec![],
            vec![scripted_agent("a", vec!["I abstain entirely"])],
        );

        let result = orchestrator.run_vote("which way?", &options).await;
        assert_eq!(result.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn consensus_reached_at_threshold() {
        let judge =
            DebateJudge::new(Arc::new(ScriptedLlm::new(vec!["Largest group: 3"])));
        let llm = Arc::new(ScriptedLlm::new(vec!["unused"]));
        let mut orchestrator = Orchestrator::new(llm).with_judge(judge);
        for name in ["a", "b", "c"] {
            orchestrator
                .register_agent(scripted_agent(name, vec!["plan x is best"]))
                .unwrap();
        }

        let result = orchestrator
            .run_consensus("what plan?", &ConsensusConfig::default())
            .await;
        assert!(result.success());
        assert_eq!(result.output["reached"], true);
        assert_eq!(result.output["rounds_used"], 1);
    }

    #[tokio::test]
    async fn consensus_exhausts_rounds_without_agreement() {
        let judge = DebateJudge::new(Arc::new(ScriptedLlm::new(vec!["Largest group: 1"])));
        let llm = Arc::new(ScriptedLlm::new(vec!["unused"]));
        let mut orchestrator = Orchestrator::new(llm).with_judge(judge);
        for name in ["a", "b"] {
            orchestrator
                .register_agent(scripted_agent(name, vec!["my own plan"]))
                .unwrap();
        }

        let config = ConsensusConfig {
            max_rounds: 2,
            threshold: 0.9,
        };
        let result = orchestrator.run_consensus("plan?", &config).await;
        assert!(result.success());
        assert_eq!(result.output["reached"], false);
        assert_eq!(result.output["rounds_used"], 2);
    }

    #[tokio::test]
    async fn cancellation_stops_sequential_run() {
        let orchestrator = orchestrator_with(
            vec![],
            vec![
                scripted_agent("a", vec!["first"]),
                scripted_agent("b", vec!["second"]),
            ],
        );
        orchestrator.cancel_token().cancel();

        let result = orchestrator.run_sequential("task").await;
        assert_eq!(result.status, TaskStatus::Cancelled);
        assert!(result.agent_outputs.is_empty());
    }

    #[test]
    fn parse_vote_prefers_choice_line() {
        let options = vec!["alpha".to_string(), "beta".to_string()];
        let (choice, rationale) =
            parse_vote("I considered beta.\nChoice: alpha\nRationale: better", &options).unwrap();
        assert_eq!(choice, "alpha");
        assert_eq!(rationale, "better");
    }

    #[test]
    fn parse_vote_falls_back_to_first_mention() {
        let options = vec!["alpha".to_string(), "beta".to_string()];
        let (choice, _) = parse_vote("beta feels right, not alpha", &options).unwrap();
        assert_eq!(choice, "beta");
    }

    #[test]
    fn parse_vote_rejects_unknown() {
        let options = vec!["alpha".to_string()];
        assert!(parse_vote("gamma all the way", &options).is_none());
    }
}

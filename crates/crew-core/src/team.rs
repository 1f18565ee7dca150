//! Team Orchestrator
//!
//! Assembles agents into a team and drives the run: first pick, then an
//! explicit loop of turn → hand-off decision → next turn. The loop is a
//! trampoline over the current agent index, so chain length never grows the
//! stack, and `max_turns` bounds the total chain regardless of how agents
//! keep handing off to each other.

use crate::context::{AgentOutput, TaskContext};
use crate::error::{CrewError, Result};
use crate::handoff::{self, HaltReason, Handoff};
use crate::progress::Spinner;
use crate::provider::ModelHandle;
use crate::reasoning::Agent;

/// Default bound on completed turns per run
pub const DEFAULT_MAX_TURNS: usize = 12;

/// Why a run ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The decision protocol declared the task complete
    Complete,

    /// The decision protocol stopped the chain
    Halted(HaltReason),

    /// A model call failed; accumulated outputs are still returned
    ProviderFailed(String),

    /// The configured turn bound was reached
    TurnLimit,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::Complete => write!(f, "task complete"),
            EndReason::Halted(reason) => write!(f, "chain halted ({reason})"),
            EndReason::ProviderFailed(error) => write!(f, "provider failed ({error})"),
            EndReason::TurnLimit => write!(f, "turn limit reached"),
        }
    }
}

/// Everything a finished run leaves behind
#[derive(Clone, Debug)]
pub struct TaskReport {
    /// One entry per completed turn, in execution order
    pub outputs: Vec<AgentOutput>,

    /// Number of completed turns
    pub turns: usize,

    /// Why the run ended
    pub ended: EndReason,
}

/// A fixed roster of agents collaborating on one task at a time
pub struct AgentTeam {
    name: String,
    description: String,
    rules: String,
    model: ModelHandle,
    agents: Vec<Agent>,
    max_turns: usize,
}

impl AgentTeam {
    pub fn builder(name: impl Into<String>) -> TeamBuilder {
        TeamBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the team on one user task
    ///
    /// Strictly sequential: at most one agent turn is active at any time.
    /// Recoverable failures end the chain but still yield the outputs
    /// accumulated so far.
    pub async fn run(&mut self, task: &str) -> Result<TaskReport> {
        if self.agents.is_empty() {
            return Err(CrewError::Config("team has no agents".into()));
        }
        if task.trim().is_empty() {
            return Err(CrewError::Config("task is empty".into()));
        }

        let roster = self.agents.iter().map(Agent::profile).collect();
        let mut ctx = TaskContext::new(
            &self.name,
            &self.description,
            &self.rules,
            task,
            roster,
            self.model.clone(),
        );
        tracing::info!(run = %ctx.run_id(), team = %self.name, task, "run started");

        let mut turns = 0;
        let mut last_finished: Option<usize> = None;

        let ended = loop {
            if turns >= self.max_turns {
                tracing::warn!(run = %ctx.run_id(), turns, "turn limit reached, stopping the chain");
                break EndReason::TurnLimit;
            }

            let spinner = Spinner::start("selecting agent...");
            let decision = handoff::decide_next(&ctx, last_finished).await;
            spinner.stop();

            let (index, subtask) = match decision {
                Ok(Handoff::Assign { index, subtask }) => (index, subtask),
                Ok(Handoff::Complete) => break EndReason::Complete,
                Ok(Handoff::Halt(reason)) => break EndReason::Halted(reason),
                Err(e) => {
                    tracing::warn!(run = %ctx.run_id(), error = %e, "decision call failed");
                    break EndReason::ProviderFailed(e.to_string());
                }
            };

            let agent = &mut self.agents[index];
            tracing::info!(run = %ctx.run_id(), agent = %agent.name(), subtask = %subtask, "hand-off");
            agent.set_subtask(subtask);
            if let Err(e) = agent.run_turn(&mut ctx).await {
                tracing::warn!(run = %ctx.run_id(), agent = %agent.name(), error = %e, "turn aborted");
                break EndReason::ProviderFailed(e.to_string());
            }

            turns += 1;
            last_finished = Some(index);
        };

        tracing::info!(run = %ctx.run_id(), team = %self.name, turns, ended = %ended, "run finished");
        Ok(TaskReport {
            outputs: ctx.into_outputs(),
            turns,
            ended,
        })
    }
}

/// Builder for [`AgentTeam`]
pub struct TeamBuilder {
    name: String,
    description: String,
    rules: String,
    model: Option<ModelHandle>,
    agents: Vec<Agent>,
    max_turns: usize,
}

impl TeamBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            rules: String::new(),
            model: None,
            agents: Vec::new(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Operating rules shown to the decision protocol
    pub fn rules(mut self, rules: impl Into<String>) -> Self {
        self.rules = rules.into();
        self
    }

    /// Team-level default model
    pub fn model(mut self, model: ModelHandle) -> Self {
        self.model = Some(model);
        self
    }

    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    /// Bound on the total number of turns in one run
    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn build(self) -> Result<AgentTeam> {
        let model = self
            .model
            .ok_or_else(|| CrewError::Config("team model is required".into()))?;
        Ok(AgentTeam {
            name: self.name,
            description: self.description,
            rules: self.rules,
            model,
            agents: self.agents,
            max_turns: self.max_turns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModelHandle;
    use crate::reasoning::Agent;
    use crate::testing::ScriptedProvider;
    use std::sync::Arc;

    fn two_agent_team(provider: Arc<ScriptedProvider>) -> AgentTeam {
        AgentTeam::builder("pair")
            .description("two agents")
            .rules("a answers, b reviews")
            .model(ModelHandle::new(provider, "scripted-model"))
            .agent(Agent::builder("a").description("answers").system_prompt("answer").build())
            .agent(Agent::builder("b").description("reviews").system_prompt("review").build())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_turn_run() {
        let provider = Arc::new(ScriptedProvider::new([
            r#"{"id": 0, "subtask": "answer the question"}"#,
            "<final_answer>42</final_answer>",
            r#"{"id": -1}"#,
        ]));
        let mut team = two_agent_team(provider);

        let report = team.run("what is the answer?").await.unwrap();

        assert_eq!(report.ended, EndReason::Complete);
        assert_eq!(report.turns, 1);
        assert_eq!(report.outputs.len(), 1);
        assert_eq!(report.outputs[0].agent_name, "a");
        assert_eq!(report.outputs[0].output, "42");
    }

    #[tokio::test]
    async fn test_two_turn_chain() {
        let provider = Arc::new(ScriptedProvider::new([
            r#"{"id": 0, "subtask": "answer"}"#,
            "<final_answer>draft</final_answer>",
            r#"{"id": 1, "subtask": "review the draft"}"#,
            "<final_answer>approved</final_answer>",
            r#"{"id": -1}"#,
        ]));
        let mut team = two_agent_team(provider);

        let report = team.run("produce a reviewed answer").await.unwrap();

        assert_eq!(report.ended, EndReason::Complete);
        assert_eq!(report.turns, 2);
        assert_eq!(report.outputs[0].output, "draft");
        assert_eq!(report.outputs[1].agent_name, "b");
        assert_eq!(report.outputs[1].output, "approved");
    }

    #[tokio::test]
    async fn test_self_handoff_stops_chain() {
        let provider = Arc::new(ScriptedProvider::new([
            r#"{"id": 0, "subtask": "answer"}"#,
            "<final_answer>42</final_answer>",
            r#"{"id": 0, "subtask": "answer again"}"#,
        ]));
        let mut team = two_agent_team(provider);

        let report = team.run("question").await.unwrap();

        assert_eq!(report.ended, EndReason::Halted(HaltReason::SelfHandoff(0)));
        assert_eq!(report.outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_verdict_stops_without_raising() {
        let provider = Arc::new(ScriptedProvider::new([
            r#"{"id": 0, "subtask": "answer"}"#,
            "<final_answer>partial work</final_answer>",
            "not json",
        ]));
        let mut team = two_agent_team(provider);

        let report = team.run("question").await.unwrap();

        assert!(matches!(report.ended, EndReason::Halted(HaltReason::MalformedVerdict(_))));
        assert_eq!(report.outputs.len(), 1);
        assert_eq!(report.outputs[0].output, "partial work");
    }

    #[tokio::test]
    async fn test_turn_limit_bounds_cycles() {
        // a and b keep handing off to each other; the bound ends the run
        let provider = Arc::new(ScriptedProvider::new([
            r#"{"id": 0, "subtask": "s"}"#,
            "<final_answer>from a</final_answer>",
            r#"{"id": 1, "subtask": "s"}"#,
            "<final_answer>from b</final_answer>",
            r#"{"id": 0, "subtask": "s"}"#,
            "<final_answer>from a</final_answer>",
            r#"{"id": 1, "subtask": "s"}"#,
            "<final_answer>from b</final_answer>",
        ]));
        let mut team = AgentTeam::builder("pair")
            .model(ModelHandle::new(provider, "scripted-model"))
            .agent(Agent::builder("a").build())
            .agent(Agent::builder("b").build())
            .max_turns(3)
            .build()
            .unwrap();

        let report = team.run("loop forever").await.unwrap();

        assert_eq!(report.ended, EndReason::TurnLimit);
        assert_eq!(report.turns, 3);
        assert_eq!(report.outputs.len(), 3);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_partial_outputs() {
        // The script runs dry after the first turn's hand-off target is
        // selected, so the second turn's model call fails
        let provider = Arc::new(ScriptedProvider::new([
            r#"{"id": 0, "subtask": "s"}"#,
            "<final_answer>kept</final_answer>",
            r#"{"id": 1, "subtask": "s"}"#,
        ]));
        let mut team = two_agent_team(provider);

        let report = team.run("question").await.unwrap();

        assert!(matches!(report.ended, EndReason::ProviderFailed(_)));
        assert_eq!(report.outputs.len(), 1);
        assert_eq!(report.outputs[0].output, "kept");
    }

    #[tokio::test]
    async fn test_empty_team_is_config_error() {
        let provider = Arc::new(ScriptedProvider::new::<_, String>([]));
        let mut team = AgentTeam::builder("empty")
            .model(ModelHandle::new(provider, "scripted-model"))
            .build()
            .unwrap();
        assert!(matches!(team.run("task").await, Err(CrewError::Config(_))));
    }
}

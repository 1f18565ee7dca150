//! Shared Task Context
//!
//! The one record threaded through a run: the user task, the fixed agent
//! roster, the append-only log of per-agent outputs, and the team-level
//! model handle. The orchestrator owns the context and lends it to each
//! turn; agents never share ambient state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::ModelHandle;

/// Lightweight roster entry for one agent
///
/// The roster index is the stable id the hand-off protocol selects by.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub description: String,
}

/// The finalized text of one completed agent turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent_name: String,
    pub output: String,
}

/// Mutable state shared across a run
///
/// Outputs are append-only: entries are never edited or removed once
/// recorded, so earlier turns remain immutable history.
pub struct TaskContext {
    team_name: String,
    team_description: String,
    team_rules: String,
    user_task: String,
    roster: Vec<AgentProfile>,
    outputs: Vec<AgentOutput>,
    model: ModelHandle,
    run_id: Uuid,
}

impl TaskContext {
    pub fn new(
        team_name: impl Into<String>,
        team_description: impl Into<String>,
        team_rules: impl Into<String>,
        user_task: impl Into<String>,
        roster: Vec<AgentProfile>,
        model: ModelHandle,
    ) -> Self {
        Self {
            team_name: team_name.into(),
            team_description: team_description.into(),
            team_rules: team_rules.into(),
            user_task: user_task.into(),
            roster,
            outputs: Vec::new(),
            model,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    pub fn team_description(&self) -> &str {
        &self.team_description
    }

    pub fn team_rules(&self) -> &str {
        &self.team_rules
    }

    pub fn user_task(&self) -> &str {
        &self.user_task
    }

    pub fn roster(&self) -> &[AgentProfile] {
        &self.roster
    }

    /// Team-level default model
    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append one completed turn to the output log
    pub fn record_output(&mut self, output: AgentOutput) {
        tracing::debug!(
            run = %self.run_id,
            agent = %output.agent_name,
            chars = output.output.len(),
            "output recorded"
        );
        self.outputs.push(output);
    }

    /// Completed turns so far, in order
    pub fn outputs(&self) -> &[AgentOutput] {
        &self.outputs
    }

    /// Consume the context, keeping only the output log
    pub fn into_outputs(self) -> Vec<AgentOutput> {
        self.outputs
    }

    /// Prior outputs rendered for prompt construction
    pub fn outputs_digest(&self) -> String {
        if self.outputs.is_empty() {
            return "(none yet)".into();
        }
        self.outputs
            .iter()
            .map(|entry| {
                format!(
                    "member name: {}\noutput content: {}\n",
                    entry.agent_name, entry.output
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Roster rendered as a JSON member list for decision prompts
    pub fn roster_digest(&self) -> String {
        self.roster
            .iter()
            .enumerate()
            .map(|(id, profile)| {
                serde_json::json!({
                    "id": id,
                    "name": profile.name,
                    "description": profile.description,
                })
                .to_string()
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

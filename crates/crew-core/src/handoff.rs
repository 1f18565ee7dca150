//! Hand-off Decision Protocol
//!
//! After a turn ends, a second, non-streaming model call returns a strict
//! JSON verdict selecting the next agent and its subtask, or a termination
//! signal. Every failure mode maps to an explicit [`Handoff`] variant; the
//! orchestrator must handle it rather than crash or silently continue. The
//! same protocol, with a first-pick prompt framing, selects the very first
//! agent before any turn has run.

use serde::Deserialize;

use crate::context::TaskContext;
use crate::error::{CrewError, Result};
use crate::message::Message;

const DECISION_MAX_TOKENS: u32 = 200;

/// The raw decision verdict the model must return
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Verdict {
    /// Roster index of the selected agent; negative means the task is done
    pub id: i64,

    /// Subtask for the selected agent
    #[serde(default)]
    pub subtask: Option<String>,
}

/// Interpreted outcome of a decision call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handoff {
    /// Continue the chain with the given agent
    Assign { index: usize, subtask: String },

    /// The task is complete
    Complete,

    /// The chain must stop for a protocol-safety reason
    Halt(HaltReason),
}

/// Why a chain was stopped short of completion
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HaltReason {
    /// The verdict was not parseable JSON with an `id`
    MalformedVerdict(String),

    /// The verdict named an id outside the roster
    UnknownAgent(i64),

    /// The verdict re-selected the agent that just finished
    SelfHandoff(usize),
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::MalformedVerdict(text) => write!(f, "malformed verdict: {text:?}"),
            HaltReason::UnknownAgent(id) => write!(f, "unknown agent id {id}"),
            HaltReason::SelfHandoff(index) => write!(f, "self hand-off by agent {index}"),
        }
    }
}

/// Parse a decision verdict, tolerating a markdown code fence around it
pub fn parse_verdict(text: &str) -> Result<Verdict> {
    let body = strip_code_fences(text);
    serde_json::from_str::<Verdict>(body)
        .map_err(|e| CrewError::Decision(format!("unparseable verdict {body:?}: {e}")))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Ask the team model who acts next
///
/// `just_finished` is the roster index of the agent whose turn just ended,
/// or `None` when picking the first agent of the run. A transport failure
/// is the only error; every protocol-level problem comes back as a
/// [`Handoff`] variant.
pub async fn decide_next(ctx: &TaskContext, just_finished: Option<usize>) -> Result<Handoff> {
    let prompt = match just_finished {
        None => first_pick_prompt(ctx),
        Some(_) => next_pick_prompt(ctx),
    };
    let messages = vec![Message::user(prompt)];
    let options = ctx
        .model()
        .options()
        .with_max_tokens(DECISION_MAX_TOKENS)
        .json();

    let completion = ctx.model().provider().complete(&messages, &options).await?;

    let verdict = match parse_verdict(&completion.content) {
        Ok(verdict) => verdict,
        Err(e) => {
            tracing::warn!(run = %ctx.run_id(), error = %e, "stopping the chain on an unreadable verdict");
            return Ok(Handoff::Halt(HaltReason::MalformedVerdict(
                completion.content,
            )));
        }
    };

    if verdict.id < 0 {
        return Ok(Handoff::Complete);
    }
    let index = verdict.id as usize;
    if index >= ctx.roster().len() {
        tracing::warn!(
            run = %ctx.run_id(),
            id = verdict.id,
            roster_len = ctx.roster().len(),
            "verdict selected an agent outside the roster, stopping"
        );
        return Ok(Handoff::Halt(HaltReason::UnknownAgent(verdict.id)));
    }
    if Some(index) == just_finished {
        tracing::warn!(
            run = %ctx.run_id(),
            agent = %ctx.roster()[index].name,
            "verdict re-selected the finishing agent, stopping"
        );
        return Ok(Handoff::Halt(HaltReason::SelfHandoff(index)));
    }

    Ok(Handoff::Assign {
        index,
        subtask: verdict.subtask.unwrap_or_default(),
    })
}

/// Prompt for selecting the very first agent of a run
fn first_pick_prompt(ctx: &TaskContext) -> String {
    format!(
        "## Role\n\
         As an expert in team task allocation, select the most suitable team member to \
         start on the task at hand, and give the subtask that member should answer. \
         After each member finishes, its result is passed on to the next member.\n\n\
         ## Team\n\
         Team Name: {name}\n\
         Team Description: {description}\n\
         Team Rules: {rules}\n\n\
         ## List of team members:\n\
         {roster}\n\n\
         ## User Original Task:\n\
         {task}\n\n\
         Return the result in the following JSON structure, with no extra content:\n\
         {{\"id\": <member_id>, \"subtask\": \"\"}}",
        name = ctx.team_name(),
        description = ctx.team_description(),
        rules = ctx.team_rules(),
        roster = ctx.roster_digest(),
        task = ctx.user_task(),
    )
}

/// Prompt for deciding whether and to whom control passes after a turn
fn next_pick_prompt(ctx: &TaskContext) -> String {
    format!(
        "## Role\n\
         You are a team decision expert. Decide whether another member of the team is \
         needed to complete the user task. If so, select the most suitable member and \
         give the subtask that member should answer. If not, return {{\"id\": -1}} directly.\n\n\
         ## Team\n\
         Team Name: {name}\n\
         Team Description: {description}\n\
         Team Rules: {rules}\n\n\
         ## List of all members:\n\
         {roster}\n\n\
         ## Attention\n\
         1. Base the decision on the user's task, the team rules, and what has already been produced.\n\
         2. If the outputs of the members that have run already answer the user's task, return \
         {{\"id\": -1}} immediately; otherwise return the next member id and subtask in the \
         following JSON structure, with no extra content: {{\"id\": <member_id>, \"subtask\": \"\"}}\n\n\
         ## Members have replied\n\
         {outputs}\n\n\
         ## User Original Task:\n\
         {task}",
        name = ctx.team_name(),
        description = ctx.team_description(),
        rules = ctx.team_rules(),
        roster = ctx.roster_digest(),
        outputs = ctx.outputs_digest(),
        task = ctx.user_task(),
    )
}

//! # crew-core
//!
//! Execution core for a turn-taking team of LLM-backed agents.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         AgentTeam                             │
//! │                                                               │
//! │  first pick ──► Agent turn (ReAct) ──► hand-off verdict ──┐   │
//! │       ▲                                                   │   │
//! │       └───────────────── next agent ◄─────────────────────┘   │
//! │                                                               │
//! │  one turn:  prompt ─► token stream ─► ResponseParser          │
//! │                 ▲                          │                  │
//! │                 └── observation ◄── tool dispatch             │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Agents share one [`TaskContext`] per run — the user task, the roster, and
//! an append-only log of per-agent outputs — and execute strictly
//! sequentially. The [`LlmProvider`] trait keeps the core independent of any
//! concrete model backend; the [`Tool`] trait does the same for
//! capabilities.

pub mod context;
pub mod error;
pub mod handoff;
pub mod message;
pub mod parser;
pub mod progress;
pub mod provider;
pub mod reasoning;
pub mod team;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{AgentOutput, AgentProfile, TaskContext};
pub use error::{CrewError, Result};
pub use handoff::{Handoff, HaltReason, Verdict};
pub use message::{Message, Role};
pub use parser::{ParsedTurn, ResponseParser};
pub use provider::{
    Completion, CompletionStream, GenerationOptions, LlmProvider, ModelHandle, StreamChunk,
    TokenUsage,
};
pub use reasoning::{ActionStep, Agent, AgentBuilder, Observation};
pub use team::{AgentTeam, EndReason, TaskReport, TeamBuilder};
pub use tool::{
    CalculatorTool, ClockTool, ParameterSchema, Tool, ToolCall, ToolRegistry, ToolResult,
    ToolSchema,
};

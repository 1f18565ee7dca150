//! Agent Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for one agent turn: build a
//! prompt, stream a model call through the tag parser, then either finish
//! with an answer or dispatch a tool and loop. Steps are bounded; a turn
//! always records an output, falling back to the raw last response when the
//! model never declares a final answer.

use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::{AgentOutput, AgentProfile, TaskContext};
use crate::error::Result;
use crate::message::Message;
use crate::parser::ResponseParser;
use crate::progress::Spinner;
use crate::provider::ModelHandle;
use crate::tool::{ToolCall, ToolRegistry, ToolResult};

/// Default bound on tool-dispatching iterations per turn
pub const DEFAULT_MAX_STEPS: usize = 5;

/// How many trailing action steps are replayed into each prompt; the full
/// history is never re-sent.
const HISTORY_WINDOW: usize = 5;

const STEP_MAX_TOKENS: u32 = 1024;

/// Result of one tool execution, as fed back into the next prompt
#[derive(Clone, Debug, Serialize)]
pub struct Observation {
    pub success: bool,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carry_over: Option<Value>,
}

impl Observation {
    /// Observation for a step whose action matched no tool
    pub fn empty() -> Self {
        Self {
            success: true,
            result: String::new(),
            carry_over: None,
        }
    }
}

impl From<ToolResult> for Observation {
    fn from(result: ToolResult) -> Self {
        let text = if result.output.is_empty() {
            result.data.as_ref().map(Value::to_string).unwrap_or_default()
        } else {
            result.output
        };
        Self {
            success: result.success,
            result: text,
            carry_over: result.carry_over,
        }
    }
}

/// One tool-invoking step inside a turn
#[derive(Clone, Debug, Serialize)]
pub struct ActionStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    pub action: Option<String>,
    pub action_input: Map<String, Value>,
    pub observation: Observation,
}

/// A team member
///
/// Created once at assembly time and reused across turns; `subtask` is set
/// by whichever hand-off selects the agent and read at the start of its own
/// turn.
pub struct Agent {
    name: String,
    description: String,
    system_prompt: String,
    model: Option<ModelHandle>,
    tools: ToolRegistry,
    subtask: String,
    max_steps: usize,
    history: Vec<ActionStep>,
}

impl Agent {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Roster entry for this agent
    pub fn profile(&self) -> AgentProfile {
        AgentProfile {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }

    /// Assign the subtask for this agent's next turn
    pub fn set_subtask(&mut self, subtask: impl Into<String>) {
        self.subtask = subtask.into();
    }

    /// Run one complete turn against the shared context
    ///
    /// On any terminal condition the turn's result is appended to the
    /// context's output log. A transport failure aborts the turn with an
    /// error and records nothing.
    pub async fn run_turn(&mut self, ctx: &mut TaskContext) -> Result<()> {
        // Only the current turn's history feeds its own prompts
        self.history.clear();

        let model = self.model.clone().unwrap_or_else(|| ctx.model().clone());
        let mut final_answer: Option<String> = None;
        let mut raw_response = String::new();
        let mut carry_over: Option<Value> = None;
        let mut steps = 0;

        tracing::info!(
            run = %ctx.run_id(),
            agent = %self.name,
            subtask = %self.subtask,
            model = model.model(),
            "turn started"
        );

        while steps < self.max_steps && final_answer.is_none() {
            let prompt = self.build_step_prompt(ctx, carry_over.as_ref());
            let messages = vec![Message::system(&self.system_prompt), Message::user(prompt)];
            let options = model.options().with_max_tokens(STEP_MAX_TOKENS);

            let mut spinner = Some(Spinner::start("thinking..."));
            let mut stream = model.provider().complete_stream(&messages, &options).await?;

            let mut parser = ResponseParser::new();
            raw_response.clear();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if !chunk.delta.is_empty() {
                    // The spinner must be gone before any token is rendered
                    if let Some(spinner) = spinner.take() {
                        spinner.stop();
                    }
                    raw_response.push_str(&chunk.delta);
                    parser.process_chunk(&chunk.delta);
                }
                if chunk.done {
                    break;
                }
            }
            if let Some(spinner) = spinner.take() {
                spinner.stop();
            }

            let parsed = parser.get_parsed_data();
            tracing::debug!(
                agent = %self.name,
                step = steps + 1,
                action = parsed.action.as_deref().unwrap_or("-"),
                answered = parsed.final_answer.is_some(),
                "step parsed"
            );

            if let Some(answer) = parsed.final_answer {
                final_answer = Some(answer);
                break;
            }

            let Some(action) = parsed.action else {
                // The model stopped without an explicit answer
                break;
            };

            let call = ToolCall::new(&action, parsed.action_input.clone());
            let observation = match self.tools.dispatch(&call).await {
                Some(result) => {
                    tracing::debug!(agent = %self.name, tool = %action, success = result.success, "tool dispatched");
                    Observation::from(result)
                }
                None => {
                    tracing::warn!(agent = %self.name, tool = %action, "no such tool, continuing with an empty observation");
                    Observation::empty()
                }
            };
            carry_over = observation.carry_over.clone();
            self.history.push(ActionStep {
                thought: parsed.thought,
                action: Some(action),
                action_input: parsed.action_input,
                observation,
            });
            steps += 1;
        }

        // A turn never silently produces nothing: without an explicit final
        // answer the raw last response stands in.
        let output = final_answer.unwrap_or(raw_response);
        tracing::info!(agent = %self.name, steps, chars = output.len(), "turn finished");
        ctx.record_output(AgentOutput {
            agent_name: self.name.clone(),
            output,
        });
        Ok(())
    }

    /// Render the prompt for one reasoning step
    fn build_step_prompt(&self, ctx: &TaskContext, carry_over: Option<&Value>) -> String {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut prompt = format!(
            "You are handling the subtask: {subtask}, as a member of the {team} team. \
             Answer in the same language as the user's original task.\n\n\
             Available tools:\n{tools}\n\n\
             Respond strictly in the following format:\n\n\
             <thought> Analyze the current situation and the next action </thought>\n\
             <action> Tool name, must be one of the available tools. May be null once the final answer is known </action>\n\
             <action_input> Tool parameters as a JSON object </action_input>\n\
             <final_answer> The final answer, as detailed and rich as possible. Omit this tag entirely while work remains </final_answer>\n\n\
             Current task context:\n\
             Current time: {now}\n\
             Team description: {description}\n\
             Other agents output:\n{outputs}\n\n\
             User original task: {task}\n\
             Your subtask: {subtask}",
            subtask = self.subtask,
            team = ctx.team_name(),
            tools = self.tools.catalogue(),
            description = ctx.team_description(),
            outputs = ctx.outputs_digest(),
            task = ctx.user_task(),
        );

        if let Some(value) = carry_over {
            prompt.push_str("\nTool state carried over: ");
            prompt.push_str(&value.to_string());
        }

        if !self.history.is_empty() {
            prompt.push_str("\n\nHistorical steps:");
            let start = self.history.len().saturating_sub(HISTORY_WINDOW);
            for step in &self.history[start..] {
                prompt.push('\n');
                prompt.push_str(&serde_json::to_string(step).unwrap_or_default());
            }
        }

        prompt
    }
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    name: String,
    description: String,
    system_prompt: String,
    model: Option<ModelHandle>,
    tools: ToolRegistry,
    max_steps: usize,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            model: None,
            tools: ToolRegistry::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Per-agent model override; without it the agent uses the team default
    pub fn model(mut self, model: ModelHandle) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tool<T: crate::tool::Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Agent {
        Agent {
            name: self.name,
            description: self.description,
            system_prompt: self.system_prompt,
            model: self.model,
            tools: self.tools,
            subtask: String::new(),
            max_steps: self.max_steps,
            history: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AgentProfile;
    use crate::provider::ModelHandle;
    use crate::testing::ScriptedProvider;
    use crate::tool::CalculatorTool;
    use std::sync::Arc;

    fn context_for(provider: Arc<ScriptedProvider>) -> TaskContext {
        TaskContext::new(
            "test team",
            "a team of testers",
            "none",
            "what is 2+2?",
            vec![AgentProfile { name: "solver".into(), description: "solves".into() }],
            ModelHandle::new(provider, "scripted-model"),
        )
    }

    #[tokio::test]
    async fn test_final_answer_terminates_turn() {
        let provider = Arc::new(ScriptedProvider::new([
            "<thought>easy</thought><final_answer>42</final_answer>",
        ]));
        let mut ctx = context_for(provider.clone());
        let mut agent = Agent::builder("solver").system_prompt("solve").build();

        agent.run_turn(&mut ctx).await.unwrap();

        assert_eq!(ctx.outputs().len(), 1);
        assert_eq!(ctx.outputs()[0].output, "42");
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_dispatch_feeds_next_prompt() {
        let provider = Arc::new(ScriptedProvider::new([
            "<thought>sum first</thought><action>calculator</action>\
             <action_input>{\"expression\": \"2+2\"}</action_input>",
            "<final_answer>the sum is 4</final_answer>",
        ]));
        let mut ctx = context_for(provider.clone());
        let mut agent = Agent::builder("solver")
            .system_prompt("solve")
            .tool(CalculatorTool)
            .build();

        agent.run_turn(&mut ctx).await.unwrap();

        assert_eq!(ctx.outputs()[0].output, "the sum is 4");
        // The second prompt replays the calculator observation
        let second_request = provider.request(1);
        let user_prompt = &second_request[1].content;
        assert!(user_prompt.contains("Historical steps:"));
        assert!(user_prompt.contains('4'));
    }

    #[tokio::test]
    async fn test_max_steps_bounds_turn() {
        let looping = "<thought>again</thought><action>calculator</action>\
                       <action_input>{\"expression\": \"1+1\"}</action_input>";
        let provider = Arc::new(ScriptedProvider::new([looping; 10]));
        let mut ctx = context_for(provider.clone());
        let mut agent = Agent::builder("solver")
            .system_prompt("solve")
            .tool(CalculatorTool)
            .max_steps(3)
            .build();

        agent.run_turn(&mut ctx).await.unwrap();

        // Three dispatching iterations, then forced termination with the
        // raw last response
        assert_eq!(provider.request_count(), 3);
        assert_eq!(ctx.outputs().len(), 1);
        assert!(ctx.outputs()[0].output.contains("<action>calculator</action>"));
    }

    #[tokio::test]
    async fn test_no_action_falls_back_to_raw_response() {
        let provider = Arc::new(ScriptedProvider::new([
            "I have nothing structured to say",
        ]));
        let mut ctx = context_for(provider.clone());
        let mut agent = Agent::builder("solver").system_prompt("solve").build();

        agent.run_turn(&mut ctx).await.unwrap();

        assert_eq!(ctx.outputs()[0].output, "I have nothing structured to say");
    }

    #[tokio::test]
    async fn test_unknown_tool_keeps_turn_alive() {
        let provider = Arc::new(ScriptedProvider::new([
            "<action>no_such_tool</action><action_input>{}</action_input>",
            "<final_answer>done anyway</final_answer>",
        ]));
        let mut ctx = context_for(provider.clone());
        let mut agent = Agent::builder("solver").system_prompt("solve").build();

        agent.run_turn(&mut ctx).await.unwrap();

        assert_eq!(ctx.outputs()[0].output, "done anyway");
    }

    #[tokio::test]
    async fn test_transport_error_records_nothing() {
        // Script exhausted immediately: the stream call fails
        let provider = Arc::new(ScriptedProvider::new::<_, String>([]));
        let mut ctx = context_for(provider.clone());
        let mut agent = Agent::builder("solver").system_prompt("solve").build();

        assert!(agent.run_turn(&mut ctx).await.is_err());
        assert!(ctx.outputs().is_empty());
    }
}

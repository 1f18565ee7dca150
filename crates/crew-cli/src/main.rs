//! crew demo binary
//!
//! Assembles a two-agent team against an HTTP model endpoint and runs one
//! task from the command line.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crew_core::{Agent, AgentTeam, CalculatorTool, ClockTool, LlmProvider, ModelHandle};
use crew_runtime::ChatApiProvider;
use crew_tools::{FileSaveTool, WebSearchTool};

const DEFAULT_TASK: &str = "Plan and implement a small command-line todo application";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize the model provider
    let provider = Arc::new(ChatApiProvider::from_env()?);
    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ model endpoint reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ model endpoint not reachable - the run will fail");
            tracing::warn!("  set LLM_API_BASE (and LLM_API_KEY if required)");
        }
    }
    let model_id = std::env::var("LLM_MODEL").unwrap_or_else(|_| "llama3.2".into());
    let model = ModelHandle::new(provider, model_id);

    // Assemble the team
    let planner = Agent::builder("product_manager")
        .description("Breaks the task down and writes the requirements")
        .system_prompt(
            "You are a product manager. You write short, precise requirements \
             for what should be built, and nothing else.",
        )
        .tool(ClockTool)
        .tool(WebSearchTool::from_env())
        .build();

    let engineer = Agent::builder("engineer")
        .description("Implements the requirements and saves the result")
        .system_prompt(
            "You are a software engineer. You implement exactly what the \
             requirements ask for, with clean, working code.",
        )
        .tool(CalculatorTool)
        .tool(FileSaveTool::default())
        .build();

    let mut team = AgentTeam::builder("software team")
        .description("A two-person software team")
        .rules(
            "The product manager writes the requirements first; the engineer \
             implements them. Stop once the implementation is delivered.",
        )
        .model(model)
        .agent(planner)
        .agent(engineer)
        .build()?;

    // Run the task from argv, or the default demo task
    let args: Vec<String> = std::env::args().skip(1).collect();
    let task = if args.is_empty() {
        DEFAULT_TASK.to_string()
    } else {
        args.join(" ")
    };

    println!("Task: {task}\n");
    let report = team.run(&task).await?;

    for output in &report.outputs {
        println!("\n=== {} ===\n{}", output.agent_name, output.output);
    }
    println!("\nRun ended: {} after {} turn(s)", report.ended, report.turns);

    Ok(())
}

//! `switchyard agent`: run the agent loop on one task.

use clap::Args;
use std::sync::Arc;
use switchyard_agent::{AgentLoop, AgentState, AgentStatus, HistoryEntry};
use switchyard_core::Role;
use switchyard_tools::ToolRegistry;

use super::{build_gateway, load_config, parse_provider};

#[derive(Args)]
pub struct AgentArgs {
    /// Provider to use (defaults to `default_provider` from config)
    #[arg(short, long)]
    pub provider: Option<String>,

    #[arg(short, long)]
    pub model: Option<String>,

    /// Overrides `agent.max_iterations`
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// The task to work on
    pub task: String,
}

pub async fn run(args: AgentArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let gateway = Arc::new(build_gateway(&config));

    let mut agent = AgentLoop::new(gateway, ToolRegistry::new()).with_config(&config.agent);
    if let Some(provider) = parse_provider(args.provider.as_deref())? {
        agent = agent.with_provider(provider);
    }
    if let Some(model) = args.model {
        agent = agent.with_model(model);
    }
    if let Some(max) = args.max_iterations {
        agent = agent.with_max_iterations(max);
    }

    let mut state = agent.new_state(args.task);
    let mut print_entry = |_: &AgentState, entry: &HistoryEntry| println!("{}", describe(entry));
    agent.run_state(&mut state, Some(&mut print_entry)).await?;

    println!();
    match state.status {
        AgentStatus::Completed => println!("  Answer: {}", state.final_answer.unwrap_or_default()),
        _ => println!("  No final answer after {} iteration(s)", state.iteration_count),
    }
    Ok(())
}

/// One printable line per history entry.
pub fn describe(entry: &HistoryEntry) -> String {
    match entry {
        HistoryEntry::Message(msg) => {
            let who = match msg.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("  {who} > {}", msg.text())
        }
        HistoryEntry::ToolCall(call) => format!("  Tool call > {}({})", call.name, call.arguments),
        HistoryEntry::ToolCallResult(result) => {
            format!("  Tool result > {}: {}", result.name, result.result_text())
        }
    }
}

// SPDX-License-Identifier: MIT

//! `fray agent` - agent introspection.
//!
//! Agent registration and the cross-process query surface are out of
//! scope, so `ls` runs against a fresh, process-local store rather than a
//! live daemon's. Against a separately-running daemon this always reports
//! an empty roster; it exists to exercise `Store::list_managed_agents`
//! end-to-end, not to replace a real query protocol.

use anyhow::Result;
use clap::{Args, Subcommand};
use fray_store::{InMemoryStore, Store};

#[derive(Args)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentCommand,
}

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List managed agents
    Ls,
}

pub async fn agent(args: AgentArgs) -> Result<()> {
    match args.command {
        AgentCommand::Ls => ls().await,
    }
}

async fn ls() -> Result<()> {
    let store = InMemoryStore::new();
    let agents = store.list_managed_agents().await?;

    if agents.is_empty() {
        println!("No managed agents.");
        return Ok(());
    }

    println!("{:<20} {:<12} {:<10}", "AGENT", "PRESENCE", "DRIVER");
    for agent in agents {
        let driver = agent
            .invoke
            .as_ref()
            .map(|invoke| invoke.driver.as_str())
            .unwrap_or("-");
        println!(
            "{:<20} {:<12} {:<10}",
            agent.agent_id.as_str(),
            agent.presence.to_string(),
            driver
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ls_against_an_empty_store_does_not_error() {
        let store = InMemoryStore::new();
        let agents = store.list_managed_agents().await.unwrap();
        assert!(agents.is_empty());
    }
}

// SPDX-License-Identifier: MIT

//! fray - operator CLI for the Fray daemon

mod commands;
mod state_dir;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{agent, daemon};

#[derive(Parser)]
#[command(name = "fray", version, about = "Operate the Fray agent supervisor daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon management
    Daemon(daemon::DaemonArgs),
    /// Agent introspection
    Agent(agent::AgentArgs),
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon(args) => daemon::daemon(args).await,
        Commands::Agent(args) => agent::agent(args).await,
    }
}

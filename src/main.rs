use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use kyco_sessions::config::Config;
use kyco_sessions::services::Services;

mod cli;
mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "kyco-sessions")]
#[command(about = "Durable agent conversations, streamed turns and reusable checkpoints")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.kyco/sessions.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides storage.data_dir from the config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = Some(data_dir);
    }
    let services = Services::open(config)?;

    match cli.command {
        Commands::Serve { port } => {
            cli::serve::serve_command(services, port).await?;
        }
        Commands::History {
            workspace,
            agent,
            limit,
            json,
        } => {
            cli::history::history_command(&services, &workspace, &agent, limit, json).await?;
        }
        Commands::State {
            agent,
            abandon_restore,
            json,
        } => {
            cli::state::state_command(&services, agent.as_deref(), abandon_restore, json)?;
        }
        Commands::Workspace { command } => {
            cli::workspace::workspace_command(&services, command)?;
        }
        Commands::Checkpoint { command } => {
            cli::checkpoint::checkpoint_command(&services, command).await?;
        }
    }

    Ok(())
}

//! CLI command definitions for kyco-sessions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the local session API
    Serve {
        /// Port to listen on (defaults to server.port from the config)
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },

    /// Show the conversation of an agent in a workspace
    History {
        workspace: String,
        agent: String,
        /// Only show the last N messages
        #[arg(long, short = 'n')]
        limit: Option<usize>,
        /// Print JSON instead of human output
        #[arg(long)]
        json: bool,
    },

    /// Show the state of one agent, or of all agents
    State {
        agent: Option<String>,
        /// Move an agent stuck in `restoring` back to `idle`
        #[arg(long, requires = "agent")]
        abandon_restore: bool,
        /// Print JSON instead of human output
        #[arg(long)]
        json: bool,
    },

    /// Manage registered workspaces
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },

    /// Save, search and restore checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
}

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// Register a workspace
    Add {
        id: String,
        /// Project directory the workspace belongs to
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Deregister a workspace (its conversations stay on disk)
    Remove { id: String },
    /// List registered workspaces
    List {
        /// Print JSON instead of human output
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Save the conversation of an agent as a checkpoint
    Save {
        workspace: String,
        agent: String,
        #[arg(long, short = 't')]
        title: String,
        #[arg(long, short = 'd', default_value = "")]
        description: String,
        /// Tags (comma-separated or repeated)
        #[arg(long = "tag", value_delimiter = ',')]
        tags: Vec<String>,
        /// What the agent learned in this conversation
        #[arg(long, short = 's', default_value = "")]
        summary: String,
        /// Expertise areas (defaults to the tags)
        #[arg(long = "area", value_delimiter = ',')]
        areas: Vec<String>,
        /// Context type (defaults to "general")
        #[arg(long)]
        context_type: Option<String>,
        /// SDK the conversation ran on
        #[arg(long, default_value = "claude")]
        agent_type: String,
        /// Do not embed the message list
        #[arg(long)]
        no_conversation: bool,
        /// Do not derive performance metrics
        #[arg(long)]
        no_analytics: bool,
        /// Print JSON response
        #[arg(long)]
        json: bool,
    },
    /// List checkpoints, newest first
    List {
        #[arg(long, short = 'n')]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Print JSON instead of human output
        #[arg(long)]
        json: bool,
    },
    /// Show a checkpoint
    Show {
        id: String,
        /// Print JSON instead of human output
        #[arg(long)]
        json: bool,
    },
    /// Search checkpoints by text and filters
    Search {
        /// Free-text query
        #[arg(default_value = "")]
        query: String,
        /// Require these tags (comma-separated or repeated)
        #[arg(long = "tag", value_delimiter = ',')]
        tags: Vec<String>,
        /// Require these expertise areas
        #[arg(long = "area", value_delimiter = ',')]
        areas: Vec<String>,
        /// Minimum performance score (0.0 - 1.0)
        #[arg(long)]
        min_score: Option<f64>,
        /// Only checkpoints used recently
        #[arg(long)]
        recent: bool,
        /// Only checkpoints created by the configured user
        #[arg(long)]
        mine: bool,
        /// relevance, recency or performance
        #[arg(long, default_value = "relevance")]
        sort: String,
        #[arg(long, short = 'n')]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Print JSON instead of human output
        #[arg(long)]
        json: bool,
    },
    /// Delete a checkpoint
    Delete { id: String },
    /// Seed an agent's conversation from a checkpoint
    Restore {
        id: String,
        /// Target workspace
        #[arg(long, short = 'w')]
        workspace: String,
        /// Target agent
        #[arg(long, short = 'a')]
        agent: String,
        /// Print JSON response
        #[arg(long)]
        json: bool,
    },
    /// Rebuild the checkpoint index from the checkpoint files
    Reindex,
}

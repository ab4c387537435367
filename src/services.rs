//! Wiring of the stores, managers and turn runner for one data directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::SdkType;
use crate::backend::{AgentBackend, BridgeBackend};
use crate::checkpoint::{CheckpointManager, ReconcileReport};
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::session::AgentSessionManager;
use crate::turn::TurnRunner;
use crate::workspace::WorkspaceStore;

/// Everything a CLI command or the HTTP API needs
pub struct Services {
    pub config: Config,
    pub data_dir: PathBuf,
    pub conversations: Arc<ConversationStore>,
    pub sessions: AgentSessionManager,
    pub checkpoints: Arc<CheckpointManager>,
    pub workspaces: Arc<WorkspaceStore>,
    pub runner: Arc<TurnRunner>,
}

/// Repairs made while recovering from a previous process
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub agents_reset: usize,
    pub checkpoints: ReconcileReport,
}

impl Services {
    /// Open the data directory with the SDK bridge as backend
    pub fn open(config: Config) -> Result<Self> {
        let sdk = SdkType::parse(&config.backend.agent_type).with_context(|| {
            format!("Unknown backend agent type: {}", config.backend.agent_type)
        })?;
        let cwd = match config.backend.cwd.clone() {
            Some(cwd) if !cwd.as_os_str().is_empty() => cwd,
            _ => std::env::current_dir().context("Failed to resolve current directory")?,
        };
        let backend = BridgeBackend::new(config.backend.bridge_url.clone(), sdk, cwd);
        Self::with_backend(config, Arc::new(backend))
    }

    /// Open the data directory with an explicit backend
    pub fn with_backend(config: Config, backend: Arc<dyn AgentBackend>) -> Result<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        config.validate()?;
        let restore_window = config
            .session
            .restore_window()
            .context("Invalid session.restore_window_hours")?;

        let conversations = Arc::new(ConversationStore::new(&data_dir));
        let sessions = AgentSessionManager::new(&data_dir, restore_window);
        let workspaces = Arc::new(
            WorkspaceStore::open(&data_dir).context("Failed to open workspace registry")?,
        );
        let checkpoints = Arc::new(CheckpointManager::new(
            &data_dir,
            config.checkpoint.clone(),
            conversations.clone(),
            sessions.clone(),
        ));
        let runner = Arc::new(TurnRunner::new(
            conversations.clone(),
            sessions.clone(),
            backend,
            workspaces.clone(),
            &config.session,
        ));

        Ok(Self {
            config,
            data_dir,
            conversations,
            sessions,
            checkpoints,
            workspaces,
            runner,
        })
    }

    /// Undo what a crashed process left behind: agents stuck mid-turn and
    /// a checkpoint index out of step with the checkpoint files.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let agents_reset = self
            .sessions
            .reset_stale()
            .context("Failed to reset stale agent states")?;
        let checkpoints = self
            .checkpoints
            .reconcile()
            .await
            .context("Failed to reconcile checkpoint index")?;

        if agents_reset > 0 {
            warn!("Reset {} agents left mid-turn", agents_reset);
        }
        info!(
            "Session data ready at {} ({} checkpoints indexed)",
            self.data_dir.display(),
            checkpoints.indexed
        );
        Ok(RecoveryReport {
            agents_reset,
            checkpoints,
        })
    }
}

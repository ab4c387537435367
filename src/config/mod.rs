//! Configuration loading and management

mod io;
mod settings;

pub use settings::{
    BackendSettings, CheckpointSettings, ServerSettings, SessionSettings, StorageSettings,
};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration structure (`~/.kyco/sessions.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub checkpoint: CheckpointSettings,
}

impl Config {
    /// Root directory for all session documents
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Self::global_config_dir().join("sessions"))
    }

    /// Reject values that cannot be used as configured
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session.restore_window().is_none() {
            anyhow::bail!(
                "session.restore_window_hours is out of range: {}",
                self.session.restore_window_hours
            );
        }
        if self.checkpoint.recent_window().is_none() {
            anyhow::bail!(
                "checkpoint.recent_days must be a non-negative day count, got {}",
                self.checkpoint.recent_days
            );
        }
        Ok(())
    }

    /// Config rooted at an explicit data directory (tests, `--data-dir`)
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.storage.data_dir = Some(data_dir.into());
        config
    }
}

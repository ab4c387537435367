//! Settings sections of the sessions config file

use std::path::PathBuf;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Where documents are stored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root directory for conversations, agent state and checkpoints.
    /// Empty means `~/.kyco/sessions`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Turn and session continuity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// How long after the last activity an external session may be resumed
    #[serde(default = "default_restore_window_hours")]
    pub restore_window_hours: u64,

    /// Persist the in-flight assistant message every N stream units (0 = only at the end)
    #[serde(default = "default_partial_save_every")]
    pub partial_save_every: usize,

    /// Number of most recent messages passed to the backend as history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_restore_window_hours() -> u64 {
    24
}

fn default_partial_save_every() -> usize {
    16
}

fn default_history_limit() -> usize {
    50
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            restore_window_hours: default_restore_window_hours(),
            partial_save_every: default_partial_save_every(),
            history_limit: default_history_limit(),
        }
    }
}

impl SessionSettings {
    /// `restore_window_hours` as a duration; `None` when it is out of range
    pub fn restore_window(&self) -> Option<TimeDelta> {
        i64::try_from(self.restore_window_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
    }
}

/// Local HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret expected in `X-KYCO-Token`.
    /// Auth is only enforced when this is non-empty.
    #[serde(default)]
    pub http_token: String,
}

fn default_port() -> u16 {
    9877
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            http_token: String::new(),
        }
    }
}

/// External agent backend (SDK bridge)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Agent SDK used for new turns ("claude" or "codex")
    #[serde(default = "default_agent_type")]
    pub agent_type: String,

    /// Working directory passed to the bridge. Empty means the current directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:17432".to_string()
}

fn default_agent_type() -> String {
    "claude".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            agent_type: default_agent_type(),
            cwd: None,
        }
    }
}

/// Checkpoint validation and search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSettings {
    #[serde(default = "default_min_title_len")]
    pub min_title_len: usize,

    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,

    #[serde(default = "default_max_tags")]
    pub max_tags: usize,

    #[serde(default = "default_max_tag_len")]
    pub max_tag_len: usize,

    /// Window for the `recently_used` search filter
    #[serde(default = "default_recent_days")]
    pub recent_days: i64,

    /// Page size when a search does not specify one
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Name recorded as `created_by`. Empty means `$USER`.
    #[serde(default)]
    pub user: String,
}

fn default_min_title_len() -> usize {
    3
}

fn default_max_title_len() -> usize {
    120
}

fn default_max_tags() -> usize {
    12
}

fn default_max_tag_len() -> usize {
    32
}

fn default_recent_days() -> i64 {
    7
}

fn default_limit() -> usize {
    20
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            min_title_len: default_min_title_len(),
            max_title_len: default_max_title_len(),
            max_tags: default_max_tags(),
            max_tag_len: default_max_tag_len(),
            recent_days: default_recent_days(),
            default_limit: default_limit(),
            user: String::new(),
        }
    }
}

impl CheckpointSettings {
    /// `recent_days` as a duration; `None` when negative or out of range
    pub fn recent_window(&self) -> Option<TimeDelta> {
        if self.recent_days < 0 {
            return None;
        }
        TimeDelta::try_days(self.recent_days)
    }

    /// Resolve the checkpoint author name
    pub fn resolved_user(&self) -> String {
        if !self.user.trim().is_empty() {
            return self.user.trim().to_string();
        }
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "local".to_string())
    }
}

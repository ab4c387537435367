//! Agent types.
//!
//! An agent is a logical conversational actor bound to one workspace and backed
//! by an external SDK session. This module holds the persisted per-agent state
//! and the SDK types checkpoints can be created for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type of SDK backing an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkType {
    /// Claude Agent SDK (Anthropic)
    #[default]
    Claude,
    /// Codex SDK (OpenAI)
    Codex,
    /// Gemini CLI
    Gemini,
    /// Custom backend behind the bridge protocol
    Custom,
}

impl SdkType {
    pub const ALL: [SdkType; 4] = [
        SdkType::Claude,
        SdkType::Codex,
        SdkType::Gemini,
        SdkType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SdkType::Claude => "claude",
            SdkType::Codex => "codex",
            SdkType::Gemini => "gemini",
            SdkType::Custom => "custom",
        }
    }

    /// Parse a user-supplied agent type (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl std::fmt::Display for SdkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Turn status of an agent. Exactly one at a time; every turn ends in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    /// A turn is in flight against the backend
    Active,
    /// A restore was granted and the caller is reattaching the external session
    Restoring,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Active => "active",
            AgentStatus::Restoring => "restoring",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted agent state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: String,

    #[serde(default)]
    pub status: AgentStatus,

    pub last_activity: DateTime<Utc>,

    /// External backend session the agent last talked to
    #[serde(default)]
    pub last_session_id: Option<String>,

    /// When `last_session_id` was recorded
    #[serde(default)]
    pub last_session_time: Option<DateTime<Utc>>,

    /// Short description of the turn in flight (first line of the user message)
    #[serde(default)]
    pub current_task: Option<String>,

    /// Completed turns
    #[serde(default)]
    pub interaction_count: u64,
}

impl AgentState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: AgentStatus::Idle,
            last_activity: Utc::now(),
            last_session_id: None,
            last_session_time: None,
            current_task: None,
            interaction_count: 0,
        }
    }

    /// Update the last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_type_parse() {
        assert_eq!(SdkType::parse("Claude"), Some(SdkType::Claude));
        assert_eq!(SdkType::parse(" codex "), Some(SdkType::Codex));
        assert_eq!(SdkType::parse("gpt-pilot"), None);
    }

    #[test]
    fn test_agent_state_defaults_on_sparse_document() {
        let state: AgentState = serde_json::from_str(
            r#"{"id":"a1","last_activity":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(state.status, AgentStatus::Idle);
        assert_eq!(state.interaction_count, 0);
        assert!(state.last_session_id.is_none());
    }
}

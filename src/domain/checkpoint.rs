use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationMessage, SdkType};

/// Metrics derived from an agent's accumulated interactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Completed turns recorded for the agent
    pub interaction_count: u64,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub tool_use_count: usize,
    pub tool_result_count: usize,
    /// Share of assistant messages that reported success (0.0 - 1.0)
    pub success_rate: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Aggregate score used for threshold filters and sorting (0.0 - 1.0)
    pub performance_score: f64,
}

/// Snapshot of the workspace a checkpoint was taken from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceContext {
    pub workspace_id: String,
    /// Free-form classification, e.g. "general", "backend", "frontend"
    pub context_type: String,
    pub message_count: usize,
    /// Files touched by tools during the conversation
    #[serde(default)]
    pub files_touched: Vec<String>,
}

/// Full conversation captured inside a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub messages: Vec<ConversationMessage>,
    pub captured_at: DateTime<Utc>,
}

/// Agent configuration at checkpoint time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfiguration {
    pub agent_type: SdkType,
    /// Tools the backend announced most recently
    #[serde(default)]
    pub tools: Vec<String>,
    /// Backend session the conversation ran in (informational only)
    #[serde(default)]
    pub last_session_id: Option<String>,
}

/// A named, reusable snapshot of a conversation's expertise.
///
/// Checkpoints are global: they outlive the workspace and agent they were
/// taken from. Only `usage_count` and `last_used` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub expertise_summary: String,
    #[serde(default)]
    pub expertise_areas: Vec<String>,
    pub performance_metrics: PerformanceMetrics,
    pub workspace_context: WorkspaceContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_conversation_state: Option<ConversationSnapshot>,
    pub agent_configuration: AgentConfiguration,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub source_workspace_id: String,
    pub source_agent_id: String,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    /// Completeness score computed at validation time (0.0 - 1.0)
    #[serde(default)]
    pub completeness: f64,
}

impl Checkpoint {
    /// Denormalized summary stored in the index
    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            expertise_summary: self.expertise_summary.clone(),
            expertise_areas: self.expertise_areas.clone(),
            context_type: self.workspace_context.context_type.clone(),
            agent_type: self.agent_configuration.agent_type,
            performance_score: self.performance_metrics.performance_score,
            created_at: self.created_at,
            created_by: self.created_by.clone(),
            source_workspace_id: self.source_workspace_id.clone(),
            source_agent_id: self.source_agent_id.clone(),
            usage_count: self.usage_count,
            last_used: self.last_used,
            has_conversation: self.full_conversation_state.is_some(),
        }
    }
}

/// Search-facing subset of a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub expertise_summary: String,
    #[serde(default)]
    pub expertise_areas: Vec<String>,
    pub context_type: String,
    pub agent_type: SdkType,
    #[serde(default)]
    pub performance_score: f64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub source_workspace_id: String,
    pub source_agent_id: String,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_conversation: bool,
}

impl CheckpointSummary {
    /// Most recent moment this checkpoint was touched (used or created)
    pub fn recency(&self) -> DateTime<Utc> {
        self.last_used.unwrap_or(self.created_at).max(self.created_at)
    }
}

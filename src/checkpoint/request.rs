use serde::{Deserialize, Serialize};

use crate::{AgentConfiguration, ConversationMessage};

/// Request to snapshot an agent's conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveCheckpointRequest {
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub expertise_summary: String,

    /// Embed the full message list in the checkpoint
    #[serde(default = "default_true")]
    pub include_full_conversation: bool,

    /// Derive performance metrics (zeroed when false)
    #[serde(default = "default_true")]
    pub analytics_enabled: bool,

    /// SDK the conversation ran on (claude, codex, gemini, custom)
    #[serde(default = "default_agent_type")]
    pub agent_type: String,

    /// Defaults to "general"
    #[serde(default)]
    pub context_type: Option<String>,

    /// Defaults to the tag list
    #[serde(default)]
    pub expertise_areas: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

fn default_agent_type() -> String {
    "claude".to_string()
}

impl SaveCheckpointRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            expertise_summary: String::new(),
            include_full_conversation: true,
            analytics_enabled: true,
            agent_type: default_agent_type(),
            context_type: None,
            expertise_areas: None,
        }
    }

    /// Tags as stored: trimmed and lowercased
    pub fn normalized_tags(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.trim().to_lowercase()).collect()
    }

    pub fn resolved_context_type(&self) -> String {
        self.context_type
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("general")
            .to_string()
    }

    pub fn resolved_expertise_areas(&self) -> Vec<String> {
        match &self.expertise_areas {
            Some(areas) => areas
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            None => self.normalized_tags(),
        }
    }
}

/// What a restore hands back for seeding a new conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePayload {
    pub checkpoint_id: String,
    pub title: String,
    pub expertise_summary: String,
    pub expertise_areas: Vec<String>,
    pub agent_configuration: AgentConfiguration,
    /// Embedded conversation, empty if the checkpoint was saved without one
    pub messages: Vec<ConversationMessage>,
    /// System prompt introducing the restored expertise
    pub seed_prompt: String,
    pub usage_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_request_defaults() {
        let request: SaveCheckpointRequest =
            serde_json::from_str(r#"{"title":"Parser work","tags":["Rust"," PARSER "]}"#).unwrap();

        assert!(request.include_full_conversation);
        assert!(request.analytics_enabled);
        assert_eq!(request.agent_type, "claude");
        assert_eq!(request.resolved_context_type(), "general");
        assert_eq!(request.resolved_expertise_areas(), vec!["rust", "parser"]);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured metadata attached to a message.
///
/// Assistant messages get this from the streaming codec: everything the
/// backend reported through control markers during the turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Tool invocations in the order they were reported
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_uses: Vec<serde_json::Value>,

    /// Tool results in the order they were reported
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<serde_json::Value>,

    /// Token usage as reported by the backend (last report wins)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,

    /// External backend session this message was produced in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Tools the backend announced at session start
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_tools: Vec<String>,

    /// Files touched by tools during the turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_changes: Vec<String>,

    /// Final result payload (last report wins)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        *self == MessageMetadata::default()
    }
}

/// A single turn entry in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Unique within a conversation; re-saving the same id replaces the message
    pub id: String,

    pub timestamp: DateTime<Utc>,

    pub role: Role,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ConversationMessage {
    /// Create a message with a fresh id
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_id(new_message_id(), role, content)
    }

    pub fn with_id(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach metadata, dropping it entirely if nothing was collected
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        };
        self
    }
}

/// Generate a message id (`msg_<uuid>`)
pub fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Persisted conversation document, one per (workspace, agent) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub agent_id: String,
    pub workspace_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new(workspace_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            workspace_id: workspace_id.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Insert or replace by message id. Returns true if an existing message was replaced.
    pub fn upsert(&mut self, message: ConversationMessage) -> bool {
        self.updated_at = Utc::now();
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                *existing = message;
                true
            }
            None => {
                self.messages.push(message);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut conv = Conversation::new("ws", "agent");
        conv.upsert(ConversationMessage::with_id("a", Role::User, "one"));
        conv.upsert(ConversationMessage::with_id("b", Role::Assistant, "partial"));
        conv.upsert(ConversationMessage::with_id("c", Role::User, "three"));

        let replaced = conv.upsert(ConversationMessage::with_id("b", Role::Assistant, "final"));
        assert!(replaced);
        assert_eq!(conv.messages.len(), 3);
        assert_eq!(conv.messages[1].id, "b");
        assert_eq!(conv.messages[1].content, "final");
    }

    #[test]
    fn test_empty_metadata_is_dropped() {
        let msg = ConversationMessage::assistant("hi").with_metadata(MessageMetadata::default());
        assert!(msg.metadata.is_none());

        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("metadata").is_none());
        assert_eq!(json["role"], "assistant");
    }
}

//! Server to client event framing.

use serde::{Deserialize, Serialize};

use super::escape_unit;

/// One event on the client stream. Events are strictly ordered: one `start`,
/// any number of `chunk`s, then exactly one of `complete` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Start,
    /// One unit of backend output, content or metadata marker alike
    Chunk { content: String },
    /// The assistant message was persisted under `message_id`
    Complete { message_id: String },
    Error { message: String },
}

impl StreamEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        StreamEvent::Chunk {
            content: content.into(),
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        StreamEvent::Error {
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start => "start",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }

    /// Frame as `data: {...}` followed by a blank line.
    ///
    /// Payload strings go through [`escape_unit`], so a frame never contains a
    /// raw line break no matter what the backend produced.
    pub fn to_wire(&self) -> String {
        let body = match self {
            StreamEvent::Start => r#"{"type":"start"}"#.to_string(),
            StreamEvent::Chunk { content } => {
                format!(r#"{{"type":"chunk","content":"{}"}}"#, escape_unit(content))
            }
            StreamEvent::Complete { message_id } => format!(
                r#"{{"type":"complete","message_id":"{}"}}"#,
                escape_unit(message_id)
            ),
            StreamEvent::Error { message } => {
                format!(r#"{{"type":"error","message":"{}"}}"#, escape_unit(message))
            }
        };
        format!("data: {body}\n\n")
    }

    /// Parse one `data:` line back into an event (client side and tests)
    pub fn from_wire(line: &str) -> Option<Self> {
        let body = line.trim().strip_prefix("data:")?.trim_start();
        serde_json::from_str(body).ok()
    }
}

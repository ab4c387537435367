use serde_json::Value;

use super::MarkerKind;
use crate::MessageMetadata;

/// Running merge of every metadata marker seen during one turn
#[derive(Debug, Default)]
pub struct MetadataAccumulator {
    metadata: MessageMetadata,
}

impl MetadataAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one decoded marker payload.
    ///
    /// SYSTEM, USAGE and RESULT are last-write-wins; TOOL_USE and TOOL_RESULT append.
    pub fn merge(&mut self, kind: MarkerKind, payload: Value) {
        match kind {
            MarkerKind::System => {
                if let Some(id) = str_field(&payload, &["session_id", "sessionId"]) {
                    self.metadata.session_id = Some(id.to_string());
                }
                if let Some(tools) = payload.get("tools").and_then(Value::as_array) {
                    self.metadata.available_tools = tools
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                }
            }
            MarkerKind::Usage => self.metadata.usage = Some(payload),
            MarkerKind::ToolUse => self.metadata.tool_uses.push(payload),
            MarkerKind::ToolResult => {
                let files = ["files_changed", "filesChanged"]
                    .iter()
                    .find_map(|key| payload.get(*key).and_then(Value::as_array));
                for file in files.into_iter().flatten().filter_map(Value::as_str) {
                    if !self.metadata.file_changes.iter().any(|f| f == file) {
                        self.metadata.file_changes.push(file.to_string());
                    }
                }
                self.metadata.tool_results.push(payload);
            }
            MarkerKind::Result => {
                if let Some(success) = payload.get("success").and_then(Value::as_bool) {
                    self.metadata.success = Some(success);
                }
                self.metadata.result = Some(payload);
            }
        }
    }

    /// Mark the turn as failed (backend error or client disconnect)
    pub fn mark_failed(&mut self) {
        self.metadata.success = Some(false);
    }

    /// Backend session id reported so far
    pub fn session_id(&self) -> Option<&str> {
        self.metadata.session_id.as_deref()
    }

    pub fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    pub fn into_metadata(self) -> MessageMetadata {
        self.metadata
    }
}

fn str_field<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

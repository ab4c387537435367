use tracing::warn;

use super::{MarkerKind, MetadataAccumulator, StreamEvent, StreamUnit, classify};
use crate::{ConversationMessage, Role, new_message_id};

/// Decoder for one assistant response.
///
/// Content goes to the message buffer, metadata markers are merged into the
/// accumulator, and every unit comes back as a `chunk` event for the client.
/// The message id is fixed up front so partial saves and the final save
/// upsert the same message.
#[derive(Debug)]
pub struct StreamingCodec {
    message_id: String,
    content: String,
    accumulator: MetadataAccumulator,
    units: usize,
    dropped: usize,
}

impl StreamingCodec {
    pub fn new() -> Self {
        Self::with_message_id(new_message_id())
    }

    pub fn with_message_id(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            content: String::new(),
            accumulator: MetadataAccumulator::new(),
            units: 0,
            dropped: 0,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Decode one unit and return the event to forward.
    ///
    /// A marker with an undecodable payload is logged and left out of the
    /// metadata; it is still forwarded and never touches the content buffer.
    pub fn push(&mut self, unit: &str) -> StreamEvent {
        self.units += 1;
        match classify(unit) {
            StreamUnit::Content(text) => self.content.push_str(text),
            StreamUnit::Metadata { kind, payload } => self.merge_marker(kind, payload),
        }
        StreamEvent::chunk(unit)
    }

    fn merge_marker(&mut self, kind: MarkerKind, payload: &str) {
        match serde_json::from_str(payload) {
            Ok(value) => self.accumulator.merge(kind, value),
            Err(e) => {
                self.dropped += 1;
                warn!(
                    "Dropping malformed {} marker in message {}: {}",
                    kind, self.message_id, e
                );
            }
        }
    }

    /// Units pushed so far
    pub fn units(&self) -> usize {
        self.units
    }

    /// Metadata markers that could not be decoded
    pub fn dropped_markers(&self) -> usize {
        self.dropped
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn session_id(&self) -> Option<&str> {
        self.accumulator.session_id()
    }

    /// Record that the stream ended abnormally
    pub fn mark_failed(&mut self) {
        self.accumulator.mark_failed();
    }

    /// Snapshot of the message as accumulated so far
    pub fn partial_message(&self) -> ConversationMessage {
        ConversationMessage::with_id(self.message_id.clone(), Role::Assistant, self.content.clone())
            .with_metadata(self.accumulator.metadata().clone())
    }

    /// The assistant message to persist: content without marker text, merged metadata
    pub fn finish(self) -> ConversationMessage {
        ConversationMessage::with_id(self.message_id, Role::Assistant, self.content)
            .with_metadata(self.accumulator.into_metadata())
    }
}

impl Default for StreamingCodec {
    fn default() -> Self {
        Self::new()
    }
}

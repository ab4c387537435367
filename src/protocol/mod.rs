//! Streaming protocol between the agent backend, this service and its clients.
//!
//! The backend emits a single text stream that mixes ordinary content with
//! inline control markers (`<<<TYPE:json>>>`). [`StreamingCodec`] classifies
//! each unit, forwards it to the client as an escaped [`StreamEvent`] and
//! accumulates what will be persisted as the assistant message.

mod accumulator;
mod codec;
mod escape;
mod events;
mod marker;

pub use accumulator::MetadataAccumulator;
pub use codec::StreamingCodec;
pub use escape::escape_unit;
pub use events::StreamEvent;
pub use marker::{MarkerKind, StreamUnit, classify, encode_marker};

//! Durable per-agent conversation logs.
//!
//! One JSON document per (workspace, agent) pair under
//! `<data_dir>/conversations/<workspace>/<agent>.json`. Writes are
//! read-modify-write of the whole document, serialized by a per-document
//! critical section.

mod store;

pub use store::{ConversationStore, ConversationWriter};

//! KYCo Sessions - durable agent conversations and reusable checkpoints
//!
//! Keeps a persistent conversation per (workspace, agent) pair, runs one
//! streamed turn at a time per agent against an external agent backend, and
//! lets a well-trained conversation be saved as a searchable checkpoint that
//! can seed new conversations later.
//!
//! ## Components
//!
//! - [`conversation::ConversationStore`]: ordered, durable message logs
//! - [`protocol::StreamingCodec`]: splits backend output into content and metadata
//! - [`session::AgentSessionManager`]: per-agent status and session resumption
//! - [`checkpoint::CheckpointManager`]: checkpoint save, search, restore and delete
//! - [`turn::TurnRunner`]: one user turn, end to end
//!
//! The binary wraps these in a CLI and a local HTTP API ([`server`]).

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod server;
pub mod services;
pub mod session;
pub mod storage;
pub mod turn;
pub mod workspace;

pub use domain::*;
pub use error::{Result, SessionError};

//! Core domain types for KYCo sessions

mod agent;
mod checkpoint;
mod message;

pub use agent::{AgentState, AgentStatus, SdkType};
pub use checkpoint::{
    AgentConfiguration, Checkpoint, CheckpointSummary, ConversationSnapshot, PerformanceMetrics,
    WorkspaceContext,
};
pub use message::{Conversation, ConversationMessage, MessageMetadata, Role, new_message_id};

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::ConversationMessage;
use crate::error::Result;

/// Stream of backend output units (content text or `<<<TYPE:json>>>` markers)
pub type UnitStream = BoxStream<'static, Result<String>>;

/// One turn's worth of input for the backend
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub workspace_id: String,
    pub agent_id: String,
    /// The new user message
    pub prompt: String,
    /// Recent conversation, oldest first, not including `prompt`
    pub history: Vec<ConversationMessage>,
    /// External session to continue, if the agent has one
    pub resume_session_id: Option<String>,
}

pub enum BackendResponse {
    /// Complete response in one piece
    Text(String),
    /// Incremental response; an `Err` item ends the turn as failed
    Stream(UnitStream),
}

impl std::fmt::Debug for BackendResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendResponse::Text(text) => f.debug_tuple("Text").field(text).finish(),
            BackendResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Opaque response generator behind an agent
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Start generating a response. Errors here mean the turn never started.
    async fn generate(&self, request: BackendRequest) -> Result<BackendResponse>;

    /// Backend identifier for logs
    fn id(&self) -> &str;
}

/// Existence check for workspaces owned outside this crate
pub trait WorkspaceDirectory: Send + Sync {
    fn exists(&self, workspace_id: &str) -> bool;
}

//! Agent backend talking to the SDK bridge over HTTP.

mod client;
mod events;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{AgentBackend, BackendRequest, BackendResponse};
use crate::error::{Result, SessionError};
use crate::{Role, SdkType};
use client::{BridgeClient, QueryRequest};

pub use events::event_units;

/// Units buffered between the blocking reader and the turn
const CHANNEL_CAPACITY: usize = 100;

/// [`AgentBackend`] backed by the SDK bridge.
///
/// The bridge answers with NDJSON events; they are read on a blocking thread,
/// translated into stream units and handed over through a channel. When the
/// consumer goes away the reader stops and the HTTP response is dropped.
pub struct BridgeBackend {
    client: BridgeClient,
    sdk: SdkType,
    cwd: PathBuf,
    id: String,
}

impl BridgeBackend {
    pub fn new(bridge_url: impl Into<String>, sdk: SdkType, cwd: PathBuf) -> Self {
        Self {
            client: BridgeClient::new(bridge_url),
            sdk,
            cwd,
            id: format!("bridge:{}", sdk),
        }
    }

    /// True if the bridge answers its health endpoint
    pub fn is_available(&self) -> bool {
        match self.client.health_check() {
            Ok(health) => {
                debug!("Bridge health: {}", health.status);
                true
            }
            Err(e) => {
                warn!("Bridge unavailable: {:#}", e);
                false
            }
        }
    }

    /// Without a session to resume, the bridge gets the recent history inline
    fn build_prompt(request: &BackendRequest) -> String {
        if request.resume_session_id.is_some() || request.history.is_empty() {
            return request.prompt.clone();
        }

        let mut prompt = String::from("Previous conversation:\n");
        for message in &request.history {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        prompt.push_str("\nCurrent request:\n");
        prompt.push_str(&request.prompt);
        prompt
    }
}

#[async_trait]
impl AgentBackend for BridgeBackend {
    async fn generate(&self, request: BackendRequest) -> Result<BackendResponse> {
        let query = QueryRequest {
            prompt: Self::build_prompt(&request),
            cwd: self.cwd.to_string_lossy().to_string(),
            session_id: request.resume_session_id.clone(),
        };
        let client = self.client.clone();
        let sdk = self.sdk.as_str();

        let (tx, rx) = mpsc::channel::<Result<String>>(CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || {
            let events = match client.query(sdk, &query) {
                Ok(events) => events,
                Err(e) => {
                    let _ = tx.blocking_send(Err(SessionError::backend(format!("{e:#}"))));
                    return;
                }
            };

            for event in events {
                let units = match event {
                    Ok(event) => event_units(event),
                    Err(e) => vec![Err(SessionError::backend(format!("{e:#}")))],
                };
                for unit in units {
                    let failed = unit.is_err();
                    if tx.blocking_send(unit).is_err() {
                        debug!("Turn consumer went away; closing bridge stream");
                        return;
                    }
                    if failed {
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|unit| (unit, rx))
        });
        Ok(BackendResponse::Stream(Box::pin(stream)))
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConversationMessage;

    fn request(history: Vec<ConversationMessage>, resume: Option<&str>) -> BackendRequest {
        BackendRequest {
            workspace_id: "ws".into(),
            agent_id: "agent".into(),
            prompt: "next step".into(),
            history,
            resume_session_id: resume.map(str::to_string),
        }
    }

    #[test]
    fn test_prompt_inlines_history_without_session() {
        let history = vec![
            ConversationMessage::user("first"),
            ConversationMessage::assistant("answer"),
        ];
        let prompt = BridgeBackend::build_prompt(&request(history.clone(), None));
        assert!(prompt.starts_with("Previous conversation:\nUser: first\nAssistant: answer\n"));
        assert!(prompt.ends_with("Current request:\nnext step"));

        assert_eq!(
            BridgeBackend::build_prompt(&request(history, Some("s-1"))),
            "next step"
        );
    }

    #[tokio::test]
    async fn test_unreachable_bridge_surfaces_backend_error() {
        use futures::StreamExt;

        // Port 9 (discard) on localhost is not an HTTP server
        let backend = BridgeBackend::new("http://127.0.0.1:9", SdkType::Claude, PathBuf::from("."));
        let BackendResponse::Stream(mut stream) = backend.generate(request(Vec::new(), None)).await.unwrap() else {
            panic!("bridge always streams");
        };
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(SessionError::Backend(_))));
        assert!(stream.next().await.is_none());
    }
}

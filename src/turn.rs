//! One user turn, end to end.
//!
//! A turn holds the agent lock and the conversation's critical section from
//! the user write to the assistant write. Backend output is decoded by the
//! streaming codec and forwarded to the client as it arrives.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ConversationMessage;
use crate::backend::{AgentBackend, BackendRequest, BackendResponse, WorkspaceDirectory};
use crate::config::SessionSettings;
use crate::conversation::{ConversationStore, ConversationWriter};
use crate::error::{Result, SessionError};
use crate::protocol::{StreamEvent, StreamingCodec};
use crate::session::AgentSessionManager;
use crate::storage;

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub user_message_id: String,
    /// Id of the persisted assistant message, if one was written
    pub assistant_message_id: Option<String>,
    /// Backend session reported during the turn
    pub session_id: Option<String>,
    /// Backend failure, already reported to the client as an `error` event
    pub error: Option<String>,
    /// The client stopped listening before the turn finished
    pub disconnected: bool,
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.disconnected
    }
}

/// What the backend phase produced
struct Exchange {
    codec: StreamingCodec,
    failure: Option<SessionError>,
    disconnected: bool,
}

/// Runs turns against one backend
pub struct TurnRunner {
    conversations: Arc<ConversationStore>,
    sessions: AgentSessionManager,
    backend: Arc<dyn AgentBackend>,
    workspaces: Arc<dyn WorkspaceDirectory>,
    partial_save_every: usize,
    history_limit: usize,
}

impl TurnRunner {
    pub fn new(
        conversations: Arc<ConversationStore>,
        sessions: AgentSessionManager,
        backend: Arc<dyn AgentBackend>,
        workspaces: Arc<dyn WorkspaceDirectory>,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            conversations,
            sessions,
            backend,
            workspaces,
            partial_save_every: settings.partial_save_every,
            history_limit: settings.history_limit,
        }
    }

    /// Run one turn, sending events to `events`.
    ///
    /// Errors returned before the `start` event (unknown workspace, busy agent,
    /// empty message) mean nothing was written. A backend failure after
    /// `start` is not an `Err`: it is sent as an `error` event and recorded in
    /// the outcome, with the user message and any partial answer persisted.
    pub async fn run(
        &self,
        workspace_id: &str,
        agent_id: &str,
        content: &str,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<TurnOutcome> {
        storage::validate_id("workspace", workspace_id)?;
        storage::validate_id("agent", agent_id)?;
        if !self.workspaces.exists(workspace_id) {
            return Err(SessionError::not_found("workspace", workspace_id));
        }
        if content.trim().is_empty() {
            return Err(SessionError::invalid("message content must not be empty"));
        }

        let guard = self.sessions.begin_turn(agent_id, content)?;
        let mut writer = self.conversations.lock(workspace_id, agent_id).await?;

        let mut history = writer.load()?;
        if history.len() > self.history_limit {
            history.drain(..history.len() - self.history_limit);
        }

        let user_message = ConversationMessage::user(content);
        let user_message_id = user_message.id.clone();
        writer.append(user_message)?;

        let request = BackendRequest {
            workspace_id: workspace_id.to_string(),
            agent_id: agent_id.to_string(),
            prompt: content.to_string(),
            history,
            resume_session_id: guard.resume_session_id().map(str::to_string),
        };

        let exchange = if events.send(StreamEvent::Start).await.is_err() {
            Exchange {
                codec: StreamingCodec::new(),
                failure: None,
                disconnected: true,
            }
        } else {
            self.exchange(request, &mut writer, &events).await
        };
        let Exchange {
            mut codec,
            failure,
            disconnected,
        } = exchange;

        if failure.is_some() || disconnected {
            codec.mark_failed();
        }
        let session_id = codec.session_id().map(str::to_string);

        // Nothing to keep if the turn failed before producing a single unit
        let persist = codec.units() > 0 || (failure.is_none() && !disconnected);
        let assistant_message_id = if persist {
            let message = codec.finish();
            let id = message.id.clone();
            if let Err(e) = writer.append(message) {
                let _ = events.send(StreamEvent::error(&e)).await;
                return Err(e);
            }
            Some(id)
        } else {
            None
        };
        drop(writer);

        if let Err(e) = guard.finish(session_id.clone(), assistant_message_id.is_some()) {
            warn!("Failed to record end of turn for {}: {}", agent_id, e);
        }

        let error = failure.map(|e| e.to_string());
        if !disconnected {
            let last = match (&error, &assistant_message_id) {
                (Some(message), _) => StreamEvent::error(message),
                (None, Some(id)) => StreamEvent::Complete {
                    message_id: id.clone(),
                },
                (None, None) => StreamEvent::error("no response was recorded"),
            };
            let _ = events.send(last).await;
        }

        match &error {
            Some(e) => warn!("Turn for {}/{} failed: {}", workspace_id, agent_id, e),
            None if disconnected => info!(
                "Client left turn for {}/{}; kept partial response",
                workspace_id, agent_id
            ),
            None => debug!("Turn for {}/{} complete", workspace_id, agent_id),
        }

        Ok(TurnOutcome {
            user_message_id,
            assistant_message_id,
            session_id,
            error,
            disconnected,
        })
    }

    /// Call the backend and pump its output through the codec to the client
    async fn exchange(
        &self,
        request: BackendRequest,
        writer: &mut ConversationWriter,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Exchange {
        let mut exchange = Exchange {
            codec: StreamingCodec::new(),
            failure: None,
            disconnected: false,
        };

        let mut stream = match self.backend.generate(request).await {
            Ok(BackendResponse::Text(text)) => {
                let event = exchange.codec.push(&text);
                exchange.disconnected = events.send(event).await.is_err();
                return exchange;
            }
            Ok(BackendResponse::Stream(stream)) => stream,
            Err(e) => {
                exchange.failure = Some(e);
                return exchange;
            }
        };

        while let Some(unit) = stream.next().await {
            let unit = match unit {
                Ok(unit) => unit,
                Err(e) => {
                    exchange.failure = Some(e);
                    break;
                }
            };

            let event = exchange.codec.push(&unit);
            if events.send(event).await.is_err() {
                // Dropping the stream tells the backend to stop
                exchange.disconnected = true;
                break;
            }

            if self.partial_save_every > 0 && exchange.codec.units() % self.partial_save_every == 0 {
                if let Err(e) = writer.append(exchange.codec.partial_message()) {
                    warn!("Partial save failed for {}: {}", exchange.codec.message_id(), e);
                }
            }
        }
        exchange
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentStatus, Role};
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Workspaces(HashSet<String>);

    impl WorkspaceDirectory for Workspaces {
        fn exists(&self, workspace_id: &str) -> bool {
            self.0.contains(workspace_id)
        }
    }

    enum Script {
        /// `Err` items become backend errors mid-stream
        Units(Vec<std::result::Result<String, String>>),
        Text(String),
        Fail(String),
        Endless,
    }

    struct ScriptedBackend {
        script: Script,
        pulled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AgentBackend for ScriptedBackend {
        async fn generate(&self, _request: BackendRequest) -> Result<BackendResponse> {
            let pulled = self.pulled.clone();
            match &self.script {
                Script::Units(units) => {
                    let units: Vec<Result<String>> = units
                        .iter()
                        .map(|u| match u {
                            Ok(s) => Ok(s.clone()),
                            Err(e) => Err(SessionError::backend(e)),
                        })
                        .collect();
                    let stream = stream::iter(units).inspect(move |_| {
                        pulled.fetch_add(1, Ordering::SeqCst);
                    });
                    Ok(BackendResponse::Stream(Box::pin(stream)))
                }
                Script::Text(text) => Ok(BackendResponse::Text(text.clone())),
                Script::Fail(message) => Err(SessionError::backend(message)),
                Script::Endless => {
                    let stream = stream::unfold(0usize, move |n| {
                        let pulled = pulled.clone();
                        async move {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            pulled.fetch_add(1, Ordering::SeqCst);
                            Some((Ok(format!("tick{n} ")), n + 1))
                        }
                    });
                    Ok(BackendResponse::Stream(Box::pin(stream)))
                }
            }
        }

        fn id(&self) -> &str {
            "scripted"
        }
    }

    struct Fixture {
        _dir: TempDir,
        conversations: Arc<ConversationStore>,
        sessions: AgentSessionManager,
        pulled: Arc<AtomicUsize>,
        runner: TurnRunner,
    }

    fn fixture(script: Script, partial_save_every: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let conversations = Arc::new(ConversationStore::new(dir.path()));
        let sessions = AgentSessionManager::new(dir.path(), chrono::Duration::hours(24));
        let pulled = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(ScriptedBackend {
            script,
            pulled: pulled.clone(),
        });
        let workspaces = Arc::new(Workspaces(HashSet::from(["ws".to_string()])));
        let settings = SessionSettings {
            partial_save_every,
            ..Default::default()
        };
        let runner = TurnRunner::new(
            conversations.clone(),
            sessions.clone(),
            backend,
            workspaces,
            &settings,
        );
        Fixture {
            _dir: dir,
            conversations,
            sessions,
            pulled,
            runner,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_text_response() {
        let f = fixture(Script::Text("plain answer".into()), 0);
        let (tx, rx) = mpsc::channel(16);

        let outcome = f.runner.run("ws", "agent", "question", tx).await.unwrap();
        let events = collect(rx).await;

        assert!(outcome.is_success());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::Start);
        assert_eq!(
            events[2],
            StreamEvent::Complete {
                message_id: outcome.assistant_message_id.clone().unwrap()
            }
        );

        let messages = f.conversations.load("ws", "agent").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "plain answer");

        let state = f.sessions.get_state("agent").unwrap().unwrap();
        assert_eq!(state.status, AgentStatus::Idle);
        assert_eq!(state.interaction_count, 1);
    }

    #[tokio::test]
    async fn test_records_backend_session() {
        let units = vec![
            Ok(r#"<<<SYSTEM:{"session_id":"sess-7"}>>>"#.to_string()),
            Ok("hi".to_string()),
        ];
        let f = fixture(Script::Units(units), 0);
        let (tx, rx) = mpsc::channel(16);

        let outcome = f.runner.run("ws", "agent", "hello", tx).await.unwrap();
        drop(collect(rx).await);

        assert_eq!(outcome.session_id.as_deref(), Some("sess-7"));
        let state = f.sessions.get_state("agent").unwrap().unwrap();
        assert_eq!(state.last_session_id.as_deref(), Some("sess-7"));
    }

    #[tokio::test]
    async fn test_unknown_workspace_and_empty_message() {
        let f = fixture(Script::Text("x".into()), 0);
        let (tx, _rx) = mpsc::channel(16);
        assert!(matches!(
            f.runner.run("nope", "agent", "hi", tx.clone()).await,
            Err(SessionError::NotFound { kind: "workspace", .. })
        ));
        assert!(matches!(
            f.runner.run("ws", "agent", "   ", tx).await,
            Err(SessionError::Validation { .. })
        ));
        assert!(f.conversations.load("ws", "agent").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_busy_agent_is_rejected() {
        let f = fixture(Script::Text("x".into()), 0);
        let _held = f.sessions.begin_turn("agent", "other turn").unwrap();
        let (tx, _rx) = mpsc::channel(16);

        let err = f.runner.run("ws", "agent", "hi", tx).await.unwrap_err();
        assert!(matches!(err, SessionError::AgentBusy { .. }));
        assert!(f.conversations.load("ws", "agent").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_user_message() {
        let f = fixture(Script::Fail("bridge down".into()), 0);
        let (tx, rx) = mpsc::channel(16);

        let outcome = f.runner.run("ws", "agent", "hi", tx).await.unwrap();
        let events = collect(rx).await;

        assert!(outcome.error.unwrap().contains("bridge down"));
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));

        let messages = f.conversations.load("ws", "agent").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(f.sessions.get_state("agent").unwrap().unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_mid_stream_error_persists_partial_answer() {
        let units = vec![Ok("partial ".to_string()), Err("stream broke".to_string())];
        let f = fixture(Script::Units(units), 0);
        let (tx, rx) = mpsc::channel(16);

        let outcome = f.runner.run("ws", "agent", "hi", tx).await.unwrap();
        let events = collect(rx).await;

        assert!(outcome.error.is_some());
        assert_eq!(events.len(), 3);
        let messages = f.conversations.load("ws", "agent").await.unwrap();
        assert_eq!(messages[1].content, "partial ");
        assert_eq!(messages[1].metadata.as_ref().unwrap().success, Some(false));
    }

    #[tokio::test]
    async fn test_partial_saves_upsert_one_message() {
        let units = (0..7).map(|i| Ok(format!("u{i} "))).collect();
        let f = fixture(Script::Units(units), 2);
        let (tx, rx) = mpsc::channel(16);

        f.runner.run("ws", "agent", "hi", tx).await.unwrap();
        drop(collect(rx).await);

        let messages = f.conversations.load("ws", "agent").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "u0 u1 u2 u3 u4 u5 u6 ");
    }

    #[tokio::test]
    async fn test_closed_client_never_reaches_backend() {
        let f = fixture(Script::Units(vec![Ok("unused".into())]), 0);
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        let outcome = f.runner.run("ws", "agent", "hi", tx).await.unwrap();
        assert!(outcome.disconnected);
        assert!(outcome.assistant_message_id.is_none());
        assert_eq!(f.pulled.load(Ordering::SeqCst), 0);
        assert_eq!(f.conversations.load("ws", "agent").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_stops_endless_backend() {
        let f = fixture(Script::Endless, 0);
        let (tx, mut rx) = mpsc::channel(1);

        let reader = tokio::spawn(async move {
            assert_eq!(rx.recv().await, Some(StreamEvent::Start));
            assert!(matches!(rx.recv().await, Some(StreamEvent::Chunk { .. })));
            // Client goes away
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            f.runner.run("ws", "agent", "go", tx),
        )
        .await
        .expect("turn must end after the client leaves")
        .unwrap();
        reader.await.unwrap();

        assert!(outcome.disconnected);
        let messages = f.conversations.load("ws", "agent").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.starts_with("tick0 "));
        assert_eq!(messages[1].metadata.as_ref().unwrap().success, Some(false));
        assert!(f.sessions.get_state("agent").unwrap().unwrap().is_idle());
    }
}

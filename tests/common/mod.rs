//! Shared test utilities for session integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;

use kyco_sessions::backend::{AgentBackend, BackendRequest, BackendResponse};
use kyco_sessions::config::Config;
use kyco_sessions::protocol::{MarkerKind, StreamEvent, encode_marker};
use kyco_sessions::services::Services;
use kyco_sessions::turn::TurnOutcome;
use kyco_sessions::{Result, SessionError};

/// One scripted backend answer
pub enum Reply {
    /// Stream these units; an `Err` ends the turn as a backend failure
    Units(Vec<std::result::Result<String, String>>),
    /// Refuse to start
    Fail(String),
}

impl Reply {
    pub fn units<I, S>(units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reply::Units(units.into_iter().map(|u| Ok(u.into())).collect())
    }
}

/// Backend that plays back queued replies and records what it was asked
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<BackendRequest>>>,
}

impl ScriptedBackend {
    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn generate(&self, request: BackendRequest) -> Result<BackendResponse> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::units(["ok"]));

        match reply {
            Reply::Units(units) => {
                let units: Vec<Result<String>> = units
                    .into_iter()
                    .map(|u| u.map_err(SessionError::backend))
                    .collect();
                Ok(BackendResponse::Stream(Box::pin(stream::iter(units))))
            }
            Reply::Fail(message) => Err(SessionError::backend(message)),
        }
    }

    fn id(&self) -> &str {
        "scripted"
    }
}

/// Isolated data directory with services wired to a scripted backend
pub struct TestEnv {
    pub dir: TempDir,
    pub backend: ScriptedBackend,
    pub services: Services,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::with_data_dir(dir.path());
        config.checkpoint.user = "tester".to_string();
        configure(&mut config);

        let backend = ScriptedBackend::default();
        let services = Services::with_backend(config, Arc::new(backend.clone()))
            .expect("Failed to open services");
        Self {
            dir,
            backend,
            services,
        }
    }

    pub fn add_workspace(&self, id: &str) {
        self.services
            .workspaces
            .add(id, None)
            .expect("Failed to add workspace");
    }

    /// Run one turn and collect every event it emitted
    pub async fn turn(
        &self,
        workspace_id: &str,
        agent_id: &str,
        content: &str,
    ) -> (Result<TurnOutcome>, Vec<StreamEvent>) {
        let (tx, mut rx) = mpsc::channel(256);
        let outcome = self
            .services
            .runner
            .run(workspace_id, agent_id, content, tx)
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (outcome, events)
    }
}

pub fn system_marker(session_id: &str) -> String {
    encode_marker(
        MarkerKind::System,
        &json!({ "session_id": session_id, "tools": ["Read", "Grep"] }),
    )
}

pub fn tool_use_marker(name: &str) -> String {
    encode_marker(
        MarkerKind::ToolUse,
        &json!({ "name": name, "input": { "pattern": "fn main" } }),
    )
}

pub fn result_marker(success: bool) -> String {
    encode_marker(MarkerKind::Result, &json!({ "success": success }))
}

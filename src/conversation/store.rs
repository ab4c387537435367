use std::path::{Path, PathBuf};

use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::storage::{self, KeyedLocks};
use crate::{Conversation, ConversationMessage};

/// File-backed conversation store
pub struct ConversationStore {
    root: PathBuf,
    locks: KeyedLocks,
}

impl ConversationStore {
    /// Create a store rooted at `<data_dir>/conversations`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("conversations"),
            locks: KeyedLocks::new(),
        }
    }

    fn document_path(&self, workspace_id: &str, agent_id: &str) -> Result<PathBuf> {
        storage::validate_id("workspace", workspace_id)?;
        storage::validate_id("agent", agent_id)?;
        Ok(self
            .root
            .join(workspace_id)
            .join(format!("{agent_id}.json")))
    }

    /// Enter the critical section for one conversation document.
    ///
    /// Every write goes through a writer; holding one across a whole turn keeps
    /// the user and assistant writes in a single critical section.
    pub async fn lock(&self, workspace_id: &str, agent_id: &str) -> Result<ConversationWriter> {
        let path = self.document_path(workspace_id, agent_id)?;
        let guard = self.locks.lock(&format!("{workspace_id}/{agent_id}")).await;
        Ok(ConversationWriter {
            path,
            workspace_id: workspace_id.to_string(),
            agent_id: agent_id.to_string(),
            _guard: guard,
        })
    }

    /// Like [`lock`](Self::lock) but fails with `AgentBusy` instead of waiting
    /// when the document is held, e.g. by a running turn.
    pub fn try_lock(&self, workspace_id: &str, agent_id: &str) -> Result<ConversationWriter> {
        let path = self.document_path(workspace_id, agent_id)?;
        let guard = self
            .locks
            .try_lock(&format!("{workspace_id}/{agent_id}"))
            .ok_or_else(|| SessionError::AgentBusy {
                agent_id: agent_id.to_string(),
            })?;
        Ok(ConversationWriter {
            path,
            workspace_id: workspace_id.to_string(),
            agent_id: agent_id.to_string(),
            _guard: guard,
        })
    }

    /// Upsert a message by id and rewrite the document
    pub async fn append(
        &self,
        workspace_id: &str,
        agent_id: &str,
        message: ConversationMessage,
    ) -> Result<()> {
        let mut writer = self.lock(workspace_id, agent_id).await?;
        writer.append(message)
    }

    /// Messages in conversation order. No document means an empty conversation.
    pub async fn load(&self, workspace_id: &str, agent_id: &str) -> Result<Vec<ConversationMessage>> {
        Ok(self
            .load_document(workspace_id, agent_id)
            .await?
            .map(|c| c.messages)
            .unwrap_or_default())
    }

    /// Full conversation document, if one exists
    pub async fn load_document(
        &self,
        workspace_id: &str,
        agent_id: &str,
    ) -> Result<Option<Conversation>> {
        let path = self.document_path(workspace_id, agent_id)?;
        storage::read_json_or_recover(&path)
    }

    /// Delete a conversation. Only ever called on explicit user action.
    pub async fn delete(&self, workspace_id: &str, agent_id: &str) -> Result<bool> {
        let writer = self.lock(workspace_id, agent_id).await?;
        storage::remove_json(&writer.path)
    }

    /// Agents with a stored conversation in a workspace
    pub fn list_agents(&self, workspace_id: &str) -> Result<Vec<String>> {
        storage::validate_id("workspace", workspace_id)?;
        storage::list_json_stems(&self.root.join(workspace_id))
    }
}

/// Exclusive write access to one conversation document
pub struct ConversationWriter {
    path: PathBuf,
    workspace_id: String,
    agent_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl ConversationWriter {
    fn read(&self) -> Result<Conversation> {
        Ok(storage::read_json_or_recover(&self.path)?
            .unwrap_or_else(|| Conversation::new(&self.workspace_id, &self.agent_id)))
    }

    /// Upsert by message id: replace in place if present, otherwise append
    pub fn append(&mut self, message: ConversationMessage) -> Result<()> {
        let mut conversation = self.read()?;
        let message_id = message.id.clone();
        let replaced = conversation.upsert(message);
        storage::write_json_atomic(&self.path, &conversation)?;
        debug!(
            "{} message {} in {}/{} ({} total)",
            if replaced { "Replaced" } else { "Appended" },
            message_id,
            self.workspace_id,
            self.agent_id,
            conversation.messages.len()
        );
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<ConversationMessage>> {
        Ok(self.read()?.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        assert!(store.load("ws", "agent").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_appends_keep_order_and_upsert_replaces() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());

        for i in 0..5 {
            store
                .append("ws", "agent", ConversationMessage::with_id(format!("m{i}"), Role::User, format!("msg {i}")))
                .await
                .unwrap();
        }
        store
            .append("ws", "agent", ConversationMessage::with_id("m2", Role::Assistant, "rewritten"))
            .await
            .unwrap();

        let messages = store.load("ws", "agent").await.unwrap();
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert_eq!(messages[2].content, "rewritten");
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_lose_messages() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append("ws", "agent", ConversationMessage::user(format!("concurrent {i}")))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.load("ws", "agent").await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_corrupt_document_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        let path = dir.path().join("conversations/ws/agent.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json at all").unwrap();

        assert!(store.load("ws", "agent").await.unwrap().is_empty());

        // Next append starts a fresh document
        store.append("ws", "agent", ConversationMessage::user("after")).await.unwrap();
        assert_eq!(store.load("ws", "agent").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        assert!(store.load("../ws", "agent").await.is_err());
        assert!(store.append("ws", "a/b", ConversationMessage::user("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_agents_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        store.append("ws", "beta", ConversationMessage::user("b")).await.unwrap();
        store.append("ws", "alpha", ConversationMessage::user("a")).await.unwrap();

        assert_eq!(store.list_agents("ws").unwrap(), vec!["alpha", "beta"]);
        assert!(store.delete("ws", "alpha").await.unwrap());
        assert!(!store.delete("ws", "alpha").await.unwrap());
        assert_eq!(store.list_agents("ws").unwrap(), vec!["beta"]);
    }
}

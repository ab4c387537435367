use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    CheckpointIndex, RestorePayload, SaveCheckpointRequest, SearchContext, SearchPage, SearchQuery,
    SortBy, derive_metrics, search, validate_request,
};
use crate::config::CheckpointSettings;
use crate::conversation::{ConversationStore, ConversationWriter};
use crate::error::{Result, SessionError};
use crate::session::AgentSessionManager;
use crate::storage;
use crate::{
    AgentConfiguration, Checkpoint, CheckpointSummary, ConversationMessage, ConversationSnapshot,
    PerformanceMetrics, SdkType, WorkspaceContext,
};

/// Stem of the index document inside the checkpoint directory
const INDEX_STEM: &str = "index";

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Entries in the index afterwards
    pub indexed: usize,
    /// Checkpoint files that had no index entry
    pub orphans_indexed: usize,
    /// Index entries whose file was gone
    pub dangling_removed: usize,
    /// Unreadable checkpoint files moved aside
    pub quarantined: usize,
}

/// Create, search, restore and delete checkpoints
pub struct CheckpointManager {
    root: PathBuf,
    settings: CheckpointSettings,
    conversations: Arc<ConversationStore>,
    sessions: AgentSessionManager,
    /// Held across every checkpoint-file + index update
    index_lock: Mutex<()>,
}

impl CheckpointManager {
    pub fn new(
        data_dir: &Path,
        settings: CheckpointSettings,
        conversations: Arc<ConversationStore>,
        sessions: AgentSessionManager,
    ) -> Self {
        Self {
            root: data_dir.join("checkpoints"),
            settings,
            conversations,
            sessions,
            index_lock: Mutex::new(()),
        }
    }

    fn checkpoint_path(&self, id: &str) -> Result<PathBuf> {
        storage::validate_id("checkpoint", id)?;
        if id == INDEX_STEM {
            return Err(SessionError::not_found("checkpoint", id));
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(format!("{INDEX_STEM}.json"))
    }

    /// Current index; a missing or corrupt index reads as empty until reconciled
    pub fn index(&self) -> Result<CheckpointIndex> {
        Ok(storage::read_json_or_recover(&self.index_path())?.unwrap_or_default())
    }

    fn write_index(&self, index: &CheckpointIndex) -> Result<()> {
        storage::write_json_atomic(&self.index_path(), index)
    }

    /// Snapshot the conversation of `agent_id` in `workspace_id`. Returns the new id.
    pub async fn save(
        &self,
        workspace_id: &str,
        agent_id: &str,
        request: SaveCheckpointRequest,
    ) -> Result<String> {
        storage::validate_id("workspace", workspace_id)?;
        storage::validate_id("agent", agent_id)?;

        let messages = self.conversations.load(workspace_id, agent_id).await?;
        let include_conversation = request.include_full_conversation && !messages.is_empty();
        let completeness =
            validate_request(&request, &self.settings, include_conversation).into_result()?;
        let agent_type = SdkType::parse(&request.agent_type).ok_or_else(|| {
            SessionError::invalid(format!("unknown agent type '{}'", request.agent_type))
        })?;

        let state = self.sessions.get_state(agent_id)?;
        let performance_metrics = if request.analytics_enabled {
            derive_metrics(state.as_ref(), &messages)
        } else {
            PerformanceMetrics::default()
        };

        let now = Utc::now();
        let last_session_id = state
            .and_then(|s| s.last_session_id)
            .or_else(|| last_metadata(&messages, |m| m.session_id.clone()));
        let tools = last_metadata(&messages, |m| {
            (!m.available_tools.is_empty()).then(|| m.available_tools.clone())
        })
        .unwrap_or_default();

        let checkpoint = Checkpoint {
            id: new_checkpoint_id(),
            title: request.title.trim().to_string(),
            description: request.description.trim().to_string(),
            tags: request.normalized_tags(),
            expertise_summary: request.expertise_summary.trim().to_string(),
            expertise_areas: request.resolved_expertise_areas(),
            performance_metrics,
            workspace_context: WorkspaceContext {
                workspace_id: workspace_id.to_string(),
                context_type: request.resolved_context_type(),
                message_count: messages.len(),
                files_touched: files_touched(&messages),
            },
            full_conversation_state: include_conversation.then(|| ConversationSnapshot {
                messages: messages.clone(),
                captured_at: now,
            }),
            agent_configuration: AgentConfiguration {
                agent_type,
                tools,
                last_session_id,
            },
            created_at: now,
            created_by: self.settings.resolved_user(),
            source_workspace_id: workspace_id.to_string(),
            source_agent_id: agent_id.to_string(),
            usage_count: 0,
            last_used: None,
            completeness,
        };

        let path = self.checkpoint_path(&checkpoint.id)?;
        let _index = self.index_lock.lock().await;
        // File first: a crash before the index write leaves an orphan, never a dangling entry
        storage::write_json_atomic(&path, &checkpoint)?;
        let mut index = self.index()?;
        index.insert(checkpoint.summary());
        self.write_index(&index)?;

        info!(
            "Saved checkpoint {} '{}' from {}/{} ({} messages, completeness {:.2})",
            checkpoint.id,
            checkpoint.title,
            workspace_id,
            agent_id,
            messages.len(),
            completeness
        );
        Ok(checkpoint.id)
    }

    pub fn load(&self, id: &str) -> Result<Checkpoint> {
        storage::read_json_or_recover(&self.checkpoint_path(id)?)?
            .ok_or_else(|| SessionError::not_found("checkpoint", id))
    }

    /// Newest first
    pub fn list(&self, limit: Option<usize>, offset: usize) -> Result<SearchPage> {
        self.search(&SearchQuery {
            sort_by: SortBy::Recency,
            limit,
            offset,
            ..Default::default()
        })
    }

    /// Ranked page of summaries. Reads only the index.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let index = self.index()?;
        let page = search(&index, query, &self.search_context());
        debug!(
            "Checkpoint search '{}' matched {} of {}",
            query.text,
            page.total,
            index.len()
        );
        Ok(page)
    }

    pub fn search_context(&self) -> SearchContext {
        SearchContext {
            user: self.settings.resolved_user(),
            now: Utc::now(),
            // Validated with the rest of the config; an unusable value filters on `now` only
            recent_window: self.settings.recent_window().unwrap_or_else(chrono::Duration::zero),
            default_limit: self.settings.default_limit,
        }
    }

    /// Record a use of the checkpoint and return its seeding payload.
    ///
    /// The source workspace and agent are never consulted, so this works after
    /// either is gone.
    pub async fn restore(
        &self,
        id: &str,
        target_workspace_id: &str,
        target_agent_id: &str,
    ) -> Result<RestorePayload> {
        storage::validate_id("workspace", target_workspace_id)?;
        storage::validate_id("agent", target_agent_id)?;
        let path = self.checkpoint_path(id)?;

        let _index = self.index_lock.lock().await;
        let mut checkpoint = self.load(id)?;
        checkpoint.usage_count += 1;
        checkpoint.last_used = Some(Utc::now());
        storage::write_json_atomic(&path, &checkpoint)?;
        let mut index = self.index()?;
        index.insert(checkpoint.summary());
        self.write_index(&index)?;

        info!(
            "Restoring checkpoint {} into {}/{} (use #{})",
            id, target_workspace_id, target_agent_id, checkpoint.usage_count
        );

        let seed_prompt = seed_prompt(&checkpoint);
        Ok(RestorePayload {
            checkpoint_id: checkpoint.id,
            title: checkpoint.title,
            expertise_summary: checkpoint.expertise_summary,
            expertise_areas: checkpoint.expertise_areas,
            agent_configuration: checkpoint.agent_configuration,
            messages: checkpoint
                .full_conversation_state
                .map(|s| s.messages)
                .unwrap_or_default(),
            seed_prompt,
            usage_count: checkpoint.usage_count,
        })
    }

    /// Write a restore payload into a conversation: the seed prompt as a
    /// system message, then the embedded messages. Returns messages written.
    ///
    /// Waits for a turn running in the target conversation to end.
    pub async fn seed_conversation(
        &self,
        payload: &RestorePayload,
        workspace_id: &str,
        agent_id: &str,
    ) -> Result<usize> {
        let mut writer = self.conversations.lock(workspace_id, agent_id).await?;
        seed(&mut writer, payload)
    }

    /// [`restore`](Self::restore) followed by seeding, without ever waiting.
    ///
    /// The target conversation is claimed first, so a running turn there fails
    /// the call with `AgentBusy` before `usage_count` is touched.
    pub async fn restore_into(
        &self,
        id: &str,
        workspace_id: &str,
        agent_id: &str,
    ) -> Result<(RestorePayload, usize)> {
        let mut writer = self.conversations.try_lock(workspace_id, agent_id)?;
        let payload = self.restore(id, workspace_id, agent_id).await?;
        let seeded = seed(&mut writer, &payload)?;
        Ok((payload, seeded))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let path = self.checkpoint_path(id)?;
        let _index = self.index_lock.lock().await;

        // Index first, so a crash in between leaves an orphan file rather than a dangling entry
        let mut index = self.index()?;
        let indexed = index.remove(id).is_some();
        if indexed {
            self.write_index(&index)?;
        }
        let removed = storage::remove_json(&path)?;

        if !indexed && !removed {
            return Err(SessionError::not_found("checkpoint", id));
        }
        info!("Deleted checkpoint {}", id);
        Ok(())
    }

    /// Rebuild the index from a full scan. Returns the number of entries.
    pub async fn reindex(&self) -> Result<usize> {
        let _index = self.index_lock.lock().await;
        let (summaries, _) = self.scan()?;
        let index = CheckpointIndex::from_summaries(summaries);
        self.write_index(&index)?;
        info!("Reindexed {} checkpoints", index.len());
        Ok(index.len())
    }

    /// Bring the index back in line with the checkpoint files
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let _index = self.index_lock.lock().await;
        let current = self.index()?;
        let (summaries, quarantined) = self.scan()?;

        let on_disk: BTreeSet<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        let orphans_indexed = summaries.iter().filter(|s| !current.contains(&s.id)).count();
        let dangling_removed = current
            .checkpoints
            .keys()
            .filter(|id| !on_disk.contains(id.as_str()))
            .count();

        let rebuilt = CheckpointIndex::from_summaries(summaries);
        if rebuilt.checkpoints != current.checkpoints {
            self.write_index(&rebuilt)?;
        }

        let report = ReconcileReport {
            indexed: rebuilt.len(),
            orphans_indexed,
            dangling_removed,
            quarantined,
        };
        if orphans_indexed + dangling_removed + quarantined > 0 {
            warn!(
                "Repaired checkpoint index: {} orphans indexed, {} dangling entries removed, {} unreadable files quarantined",
                orphans_indexed, dangling_removed, quarantined
            );
        }
        Ok(report)
    }

    /// Read every checkpoint file. Unreadable ones are moved aside and counted.
    fn scan(&self) -> Result<(Vec<CheckpointSummary>, usize)> {
        let mut summaries = Vec::new();
        let mut quarantined = 0;

        for stem in storage::list_json_stems(&self.root)? {
            if stem == INDEX_STEM {
                continue;
            }
            let path = self.root.join(format!("{stem}.json"));
            match storage::read_json::<Checkpoint>(&path) {
                Ok(Some(checkpoint)) if checkpoint.id == stem => summaries.push(checkpoint.summary()),
                Ok(Some(checkpoint)) => warn!(
                    "Skipping {}: file holds checkpoint {}",
                    path.display(),
                    checkpoint.id
                ),
                Ok(None) => {}
                Err(SessionError::CorruptState { path, reason }) => {
                    warn!("Unreadable checkpoint {}: {}", path.display(), reason);
                    if storage::quarantine(&path).is_some() {
                        storage::remove_json(&path)?;
                        quarantined += 1;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok((summaries, quarantined))
    }
}

fn new_checkpoint_id() -> String {
    format!("cp_{}", uuid::Uuid::new_v4().simple())
}

/// Most recent message metadata for which `pick` returns a value
fn last_metadata<T>(
    messages: &[ConversationMessage],
    pick: impl Fn(&crate::MessageMetadata) -> Option<T>,
) -> Option<T> {
    messages
        .iter()
        .rev()
        .filter_map(|m| m.metadata.as_ref())
        .find_map(pick)
}

fn files_touched(messages: &[ConversationMessage]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for metadata in messages.iter().filter_map(|m| m.metadata.as_ref()) {
        for file in &metadata.file_changes {
            if !files.contains(file) {
                files.push(file.clone());
            }
        }
    }
    files
}

fn seed_prompt(checkpoint: &Checkpoint) -> String {
    let mut prompt = format!(
        "You are continuing from the checkpoint \"{}\".",
        checkpoint.title
    );
    if !checkpoint.description.is_empty() {
        prompt.push_str(&format!("\n\n{}", checkpoint.description));
    }
    if !checkpoint.expertise_summary.is_empty() {
        prompt.push_str(&format!(
            "\n\nExpertise carried over:\n{}",
            checkpoint.expertise_summary
        ));
    }
    if !checkpoint.expertise_areas.is_empty() {
        prompt.push_str(&format!(
            "\n\nAreas: {}",
            checkpoint.expertise_areas.join(", ")
        ));
    }
    if !checkpoint.workspace_context.files_touched.is_empty() {
        prompt.push_str(&format!(
            "\n\nFiles worked on previously: {}",
            checkpoint.workspace_context.files_touched.join(", ")
        ));
    }
    prompt
}

fn seed(writer: &mut ConversationWriter, payload: &RestorePayload) -> Result<usize> {
    writer.append(ConversationMessage::system(payload.seed_prompt.clone()))?;
    for message in &payload.messages {
        writer.append(message.clone())?;
    }
    Ok(payload.messages.len() + 1)
}

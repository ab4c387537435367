use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::restore::{RestoreOutcome, check_restore};
use crate::error::{Result, SessionError};
use crate::storage::{self, KeyedLocks};
use crate::{AgentState, AgentStatus};

/// Longest `current_task` kept in the state document
const MAX_TASK_LEN: usize = 120;

/// Owner of agent state documents and the per-agent turn lock
#[derive(Clone)]
pub struct AgentSessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    restore_window: Duration,
    turns: KeyedLocks,
    /// Serializes read-modify-write of state documents
    write: Mutex<()>,
}

impl AgentSessionManager {
    /// Manage state documents under `<data_dir>/agents`
    pub fn new(data_dir: &Path, restore_window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: data_dir.join("agents"),
                restore_window,
                turns: KeyedLocks::new(),
                write: Mutex::new(()),
            }),
        }
    }

    fn state_path(&self, agent_id: &str) -> Result<PathBuf> {
        storage::validate_id("agent", agent_id)?;
        Ok(self.inner.root.join(format!("{agent_id}.json")))
    }

    /// Stored state, if the agent ever ran a turn
    pub fn get_state(&self, agent_id: &str) -> Result<Option<AgentState>> {
        storage::read_json_or_recover(&self.state_path(agent_id)?)
    }

    pub fn save_state(&self, state: &AgentState) -> Result<()> {
        let path = self.state_path(&state.id)?;
        let _write = self.inner.write.lock().unwrap_or_else(PoisonError::into_inner);
        storage::write_json_atomic(&path, state)
    }

    pub fn list_states(&self) -> Result<Vec<AgentState>> {
        let mut states = Vec::new();
        for id in storage::list_json_stems(&self.inner.root)? {
            if let Some(state) = self.get_state(&id)? {
                states.push(state);
            }
        }
        Ok(states)
    }

    /// Read-modify-write of one state document. A missing document starts from defaults.
    fn update<T>(&self, agent_id: &str, apply: impl FnOnce(&mut AgentState) -> T) -> Result<(AgentState, T)> {
        let path = self.state_path(agent_id)?;
        let _write = self.inner.write.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = storage::read_json_or_recover(&path)?
            .unwrap_or_else(|| AgentState::new(agent_id));
        let out = apply(&mut state);
        storage::write_json_atomic(&path, &state)?;
        Ok((state, out))
    }

    /// Start a turn: take the agent lock and move to `active`.
    ///
    /// Fails with `AgentBusy` instead of waiting when another turn holds the lock.
    pub fn begin_turn(&self, agent_id: &str, task: &str) -> Result<TurnGuard> {
        storage::validate_id("agent", agent_id)?;
        let lock = self
            .inner
            .turns
            .try_lock(agent_id)
            .ok_or_else(|| SessionError::AgentBusy {
                agent_id: agent_id.to_string(),
            })?;

        let (state, ()) = self.update(agent_id, |state| {
            state.status = AgentStatus::Active;
            state.current_task = summarize_task(task);
            state.touch();
        })?;
        debug!("Agent {} is active", agent_id);

        Ok(TurnGuard {
            manager: self.clone(),
            agent_id: agent_id.to_string(),
            resume_session_id: state.last_session_id,
            finished: false,
            _lock: lock,
        })
    }

    /// Attempt to continue the agent's external session `session_id`
    pub fn restore(&self, agent_id: &str, session_id: &str) -> Result<RestoreOutcome> {
        self.restore_at(agent_id, session_id, Utc::now())
    }

    /// [`restore`](Self::restore) evaluated at an explicit time
    pub fn restore_at(
        &self,
        agent_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RestoreOutcome> {
        storage::validate_id("agent", agent_id)?;
        let _lock = self
            .inner
            .turns
            .try_lock(agent_id)
            .ok_or_else(|| SessionError::AgentBusy {
                agent_id: agent_id.to_string(),
            })?;

        if self.get_state(agent_id)?.is_none() {
            return Ok(RestoreOutcome::refused("agent has no recorded session"));
        }

        let window = self.inner.restore_window;
        let (_, outcome) = self.update(agent_id, |state| {
            match check_restore(state, session_id, now, window) {
                Ok(()) => {
                    state.status = AgentStatus::Restoring;
                    RestoreOutcome::granted()
                }
                Err(SessionError::RestoreIneligible { reason }) => {
                    state.last_session_id = None;
                    state.last_session_time = None;
                    RestoreOutcome::refused(reason)
                }
                Err(e) => RestoreOutcome::refused(e.to_string()),
            }
        })?;

        if outcome.restored {
            info!("Agent {} restoring session {}", agent_id, session_id);
        } else {
            info!(
                "Agent {} cannot restore session {}: {}",
                agent_id,
                session_id,
                outcome.reason.as_deref().unwrap_or("ineligible")
            );
        }
        Ok(outcome)
    }

    /// Leave `restoring` without starting a turn (reattach failed or was abandoned).
    /// Any other status is left alone.
    pub fn abandon_restore(&self, agent_id: &str) -> Result<AgentState> {
        if self.get_state(agent_id)?.is_none() {
            return Err(SessionError::not_found("agent", agent_id));
        }
        let (state, abandoned) = self.update(agent_id, |state| {
            let restoring = state.status == AgentStatus::Restoring;
            if restoring {
                state.status = AgentStatus::Idle;
            }
            restoring
        })?;
        if abandoned {
            info!("Agent {} abandoned its restore", agent_id);
        }
        Ok(state)
    }

    /// Return agents left `active`/`restoring` by a crashed process to `idle`
    pub fn reset_stale(&self) -> Result<usize> {
        let mut reset = 0;
        for state in self.list_states()? {
            if state.is_idle() || self.inner.turns.try_lock(&state.id).is_none() {
                continue;
            }
            self.update(&state.id, |state| {
                state.status = AgentStatus::Idle;
                state.current_task = None;
            })?;
            warn!("Reset agent {} from {} to idle", state.id, state.status);
            reset += 1;
        }
        Ok(reset)
    }

    fn end_turn(&self, agent_id: &str, session_id: Option<String>, answered: bool) -> Result<AgentState> {
        let (state, ()) = self.update(agent_id, |state| {
            state.status = AgentStatus::Idle;
            state.current_task = None;
            if answered {
                state.interaction_count += 1;
            }
            if let Some(session_id) = session_id {
                state.last_session_id = Some(session_id);
                state.last_session_time = Some(Utc::now());
            }
            state.touch();
        })?;
        debug!("Agent {} is idle ({} interactions)", agent_id, state.interaction_count);
        Ok(state)
    }
}

fn summarize_task(task: &str) -> Option<String> {
    let line = task.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.chars().take(MAX_TASK_LEN).collect())
}

/// Exclusive right to run one turn for an agent.
///
/// Call [`finish`](Self::finish) on the way out. If the guard is dropped
/// unfinished (panic, cancelled future) the agent is still put back to `idle`.
pub struct TurnGuard {
    manager: AgentSessionManager,
    agent_id: String,
    resume_session_id: Option<String>,
    finished: bool,
    _lock: OwnedMutexGuard<()>,
}

impl TurnGuard {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Backend session the previous turn ran in
    pub fn resume_session_id(&self) -> Option<&str> {
        self.resume_session_id.as_deref()
    }

    /// End the turn: back to `idle` and remember the backend session.
    ///
    /// `answered` says whether an assistant message was recorded. Only those
    /// turns add to `interaction_count`; a turn that failed before any output
    /// does not.
    pub fn finish(mut self, session_id: Option<String>, answered: bool) -> Result<AgentState> {
        self.finished = true;
        self.manager.end_turn(&self.agent_id, session_id, answered)
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.manager.end_turn(&self.agent_id, None, false) {
            warn!("Failed to release agent {}: {}", self.agent_id, e);
        }
    }
}

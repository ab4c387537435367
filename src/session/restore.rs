use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::AgentState;
use crate::error::{Result, SessionError};

/// Answer to a restore attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreOutcome {
    /// True if the caller may reattach the external session
    pub restored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RestoreOutcome {
    pub fn granted() -> Self {
        Self {
            restored: true,
            reason: None,
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            restored: false,
            reason: Some(reason.into()),
        }
    }
}

/// Continuity check: same session id and last activity inside the window.
///
/// This is the whole contract; the backend's own session state is opaque.
pub fn check_restore(
    state: &AgentState,
    session_id: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<()> {
    match state.last_session_id.as_deref() {
        Some(last) if last == session_id => {}
        Some(_) => {
            return Err(SessionError::RestoreIneligible {
                reason: "session id does not match the agent's last session".to_string(),
            });
        }
        None => {
            return Err(SessionError::RestoreIneligible {
                reason: "agent has no recorded session".to_string(),
            });
        }
    }

    let idle_for = now - state.last_activity;
    if idle_for >= window {
        return Err(SessionError::RestoreIneligible {
            reason: format!(
                "last activity {}h ago exceeds the {}h window",
                idle_for.num_hours(),
                window.num_hours()
            ),
        });
    }
    Ok(())
}

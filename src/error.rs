//! Error taxonomy for the session and checkpoint subsystem.

use std::path::PathBuf;

/// Errors surfaced by the session, conversation and checkpoint components.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Malformed request; carries every violated constraint, not just the first
    #[error("validation failed: {}", violations.join("; "))]
    Validation { violations: Vec<String> },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Unparseable stored document. Loads recover from this locally, so it only
    /// shows up where a caller explicitly asks for strict parsing.
    #[error("corrupt state in {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// Session too old or id mismatch. A normal negative answer, not a fault.
    #[error("restore not possible: {reason}")]
    RestoreIneligible { reason: String },

    #[error("agent {agent_id} already has an active turn")]
    AgentBusy { agent_id: String },

    #[error("agent backend failed: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub fn validation(violations: Vec<String>) -> Self {
        SessionError::Validation { violations }
    }

    pub fn invalid(violation: impl Into<String>) -> Self {
        SessionError::Validation {
            violations: vec![violation.into()],
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        SessionError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn backend(message: impl std::fmt::Display) -> Self {
        SessionError::Backend(message.to_string())
    }

    /// HTTP status code used by the local API
    pub fn status_code(&self) -> u16 {
        match self {
            SessionError::Validation { .. } => 400,
            SessionError::NotFound { .. } => 404,
            SessionError::AgentBusy { .. } => 409,
            SessionError::RestoreIneligible { .. } => 422,
            SessionError::Backend(_) => 502,
            SessionError::CorruptState { .. } | SessionError::Io(_) | SessionError::Json(_) => 500,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Validation { .. } => "validation_failed",
            SessionError::NotFound { .. } => "not_found",
            SessionError::CorruptState { .. } => "corrupt_state",
            SessionError::RestoreIneligible { .. } => "restore_ineligible",
            SessionError::AgentBusy { .. } => "agent_busy",
            SessionError::Backend(_) => "backend_error",
            SessionError::Io(_) => "io_error",
            SessionError::Json(_) => "json_error",
        }
    }

    /// JSON body for API responses
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SessionError::Validation { violations } => serde_json::json!({
                "error": self.code(),
                "violations": violations,
            }),
            _ => serde_json::json!({
                "error": self.code(),
                "details": self.to_string(),
            }),
        }
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_lists_every_violation() {
        let err = SessionError::validation(vec![
            "title is required".to_string(),
            "unknown agent type 'x'".to_string(),
        ]);
        let message = err.to_string();
        assert!(message.contains("title is required"));
        assert!(message.contains("unknown agent type"));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_json()["violations"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SessionError::not_found("checkpoint", "abc").status_code(), 404);
        assert_eq!(
            SessionError::AgentBusy { agent_id: "a".into() }.status_code(),
            409
        );
        assert_eq!(SessionError::backend("boom").code(), "backend_error");
    }
}

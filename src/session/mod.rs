//! Per-agent turn status and external session continuity.
//!
//! Status moves `idle -> active -> idle` around every turn and
//! `idle -> restoring -> {active | idle}` around a restore attempt. The
//! one-turn-per-agent rule is a real lock: [`AgentSessionManager::begin_turn`]
//! fails with `AgentBusy` while another [`TurnGuard`] for the agent is alive.

mod manager;
mod restore;

pub use manager::{AgentSessionManager, TurnGuard};
pub use restore::{RestoreOutcome, check_restore};

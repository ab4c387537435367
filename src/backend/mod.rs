//! External collaborators: the agent backend and the workspace directory.
//!
//! The core never talks to an agent process directly. It calls an
//! [`AgentBackend`] that yields either a finished string or a stream of units
//! in the mixed content/marker format, and asks a [`WorkspaceDirectory`]
//! whether a workspace exists.

mod bridge;
mod traits;

pub use bridge::{BridgeBackend, event_units};
pub use traits::{AgentBackend, BackendRequest, BackendResponse, UnitStream, WorkspaceDirectory};

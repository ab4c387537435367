//! Workspace registry
//!
//! Workspaces are owned by the surrounding application; this crate only needs
//! to know which ids exist. The registry is a small JSON document at
//! `<data_dir>/workspaces.json` and backs the [`WorkspaceDirectory`] check
//! that turns consult before accepting a message.
//!
//! [`WorkspaceDirectory`]: crate::backend::WorkspaceDirectory

mod registry;

pub use registry::{Workspace, WorkspaceRegistry, WorkspaceStore};

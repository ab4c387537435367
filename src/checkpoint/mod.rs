//! Reusable conversation checkpoints.
//!
//! Checkpoints are global: one JSON document per checkpoint under
//! `<data_dir>/checkpoints/`, plus `index.json` holding a denormalized summary
//! of each one for search. The checkpoint file is always written before the
//! index, so a crash leaves at worst an orphaned file that
//! [`CheckpointManager::reconcile`] picks up again.

mod index;
mod manager;
mod metrics;
mod request;
mod search;
mod validation;

pub use index::{CheckpointIndex, SearchMetadata};
pub use manager::{CheckpointManager, ReconcileReport};
pub use metrics::derive_metrics;
pub use request::{RestorePayload, SaveCheckpointRequest};
pub use search::{SearchContext, SearchFilters, SearchHit, SearchPage, SearchQuery, SortBy, search};
pub use validation::{ValidationReport, validate_request};

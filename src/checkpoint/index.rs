use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CheckpointSummary;

/// Aggregates kept alongside the summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    #[serde(default)]
    pub tag_frequency: BTreeMap<String, usize>,
    #[serde(default)]
    pub context_type_frequency: BTreeMap<String, usize>,
    /// Every expertise area in use, sorted and de-duplicated
    #[serde(default)]
    pub expertise_areas: Vec<String>,
}

/// Index document: checkpoint id -> summary plus search aggregates.
///
/// Always derivable from the checkpoint files; aggregates are recomputed on
/// every change rather than patched incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointIndex {
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub checkpoints: BTreeMap<String, CheckpointSummary>,
    #[serde(default)]
    pub search_metadata: SearchMetadata,
}

impl Default for CheckpointIndex {
    fn default() -> Self {
        Self {
            last_updated: Utc::now(),
            checkpoints: BTreeMap::new(),
            search_metadata: SearchMetadata::default(),
        }
    }
}

impl CheckpointIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a full scan of checkpoint summaries
    pub fn from_summaries(summaries: impl IntoIterator<Item = CheckpointSummary>) -> Self {
        let mut index = Self::new();
        index.checkpoints = summaries.into_iter().map(|s| (s.id.clone(), s)).collect();
        index.refresh();
        index
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, summary: CheckpointSummary) {
        self.checkpoints.insert(summary.id.clone(), summary);
        self.refresh();
    }

    pub fn remove(&mut self, id: &str) -> Option<CheckpointSummary> {
        let removed = self.checkpoints.remove(id);
        if removed.is_some() {
            self.refresh();
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&CheckpointSummary> {
        self.checkpoints.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.checkpoints.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn summaries(&self) -> impl Iterator<Item = &CheckpointSummary> {
        self.checkpoints.values()
    }

    fn refresh(&mut self) {
        let mut metadata = SearchMetadata::default();
        for summary in self.checkpoints.values() {
            for tag in &summary.tags {
                *metadata.tag_frequency.entry(tag.clone()).or_default() += 1;
            }
            *metadata
                .context_type_frequency
                .entry(summary.context_type.clone())
                .or_default() += 1;
            metadata
                .expertise_areas
                .extend(summary.expertise_areas.iter().cloned());
        }
        metadata.expertise_areas.sort();
        metadata.expertise_areas.dedup();

        self.search_metadata = metadata;
        self.last_updated = Utc::now();
    }
}

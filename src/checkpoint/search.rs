//! Checkpoint search over the index.
//!
//! Filters are hard AND predicates. Free text is split into keywords and each
//! keyword scores against the summary fields; fuzzy Jaro-Winkler hits on title
//! words and tags catch typos when there is no direct hit.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

use super::CheckpointIndex;
use crate::CheckpointSummary;

/// Minimum similarity for a fuzzy keyword hit
const FUZZY_THRESHOLD: f64 = 0.88;

/// Hard cap on one page
const MAX_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Recency,
    Performance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Every listed tag must be present
    #[serde(default)]
    pub tags: Vec<String>,
    /// Every listed expertise area must be present
    #[serde(default)]
    pub expertise_areas: Vec<String>,
    #[serde(default)]
    pub performance_threshold: Option<f64>,
    /// Only checkpoints used within the recent window
    #[serde(default)]
    pub recently_used: bool,
    /// Only checkpoints created by the current user
    #[serde(default)]
    pub my_checkpoints: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Environment a query is evaluated in
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub user: String,
    pub now: DateTime<Utc>,
    /// Window for the `recently_used` filter
    pub recent_window: Duration,
    pub default_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub summary: CheckpointSummary,
    pub score: u32,
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// Matches before pagination
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub results: Vec<SearchHit>,
}

impl SearchPage {
    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|h| h.summary.id.as_str()).collect()
    }
}

/// Run a query against the index
pub fn search(index: &CheckpointIndex, query: &SearchQuery, ctx: &SearchContext) -> SearchPage {
    let keywords = keywords(&query.text);

    let mut hits: Vec<SearchHit> = index
        .summaries()
        .filter(|summary| passes_filters(summary, &query.filters, ctx))
        .filter_map(|summary| {
            let score = keywords.iter().map(|k| score_keyword(summary, k)).sum();
            if !keywords.is_empty() && score == 0 {
                return None;
            }
            Some(SearchHit {
                summary: summary.clone(),
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| compare(a, b, query.sort_by));

    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(ctx.default_limit)
        .min(MAX_LIMIT);
    let total = hits.len();
    let results = hits.into_iter().skip(query.offset).take(limit).collect();

    SearchPage {
        total,
        offset: query.offset,
        limit,
        results,
    }
}

fn keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in text.split_whitespace().map(str::to_lowercase) {
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|h| h.eq_ignore_ascii_case(needle))
}

fn passes_filters(summary: &CheckpointSummary, filters: &SearchFilters, ctx: &SearchContext) -> bool {
    if !filters
        .tags
        .iter()
        .all(|tag| contains_ignore_case(&summary.tags, tag.trim()))
    {
        return false;
    }
    if !filters
        .expertise_areas
        .iter()
        .all(|area| contains_ignore_case(&summary.expertise_areas, area.trim()))
    {
        return false;
    }
    if let Some(threshold) = filters.performance_threshold {
        if summary.performance_score < threshold {
            return false;
        }
    }
    if filters.recently_used {
        let recent = summary
            .last_used
            .is_some_and(|used| ctx.now - used <= ctx.recent_window);
        if !recent {
            return false;
        }
    }
    if filters.my_checkpoints && summary.created_by != ctx.user {
        return false;
    }
    true
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric() && !matches!(c, '+' | '#'))
        .filter(|w| !w.is_empty())
}

fn score_keyword(summary: &CheckpointSummary, keyword: &str) -> u32 {
    let title = summary.title.to_lowercase();
    let mut score = 0;
    let mut direct = false;

    if title.contains(keyword) {
        score += 10;
        direct = true;
        if words(&title).any(|w| w == keyword) {
            score += 5;
        }
    }
    if summary.tags.iter().any(|t| t.to_lowercase() == keyword) {
        score += 8;
        direct = true;
    }
    if summary
        .expertise_areas
        .iter()
        .any(|a| a.to_lowercase().contains(keyword))
    {
        score += 6;
    }
    if summary.expertise_summary.to_lowercase().contains(keyword) {
        score += 4;
    }
    if summary.description.to_lowercase().contains(keyword) {
        score += 2;
    }

    // Typo tolerance on the short fields
    if !direct && keyword.chars().count() >= 3 {
        let fuzzy = words(&title)
            .map(str::to_string)
            .chain(summary.tags.iter().map(|t| t.to_lowercase()))
            .any(|candidate| jaro_winkler(&candidate, keyword) >= FUZZY_THRESHOLD);
        if fuzzy {
            score += 3;
        }
    }

    score
}

fn compare(a: &SearchHit, b: &SearchHit, sort_by: SortBy) -> Ordering {
    let primary = match sort_by {
        SortBy::Relevance => b.score.cmp(&a.score),
        SortBy::Recency => b.summary.recency().cmp(&a.summary.recency()),
        SortBy::Performance => b
            .summary
            .performance_score
            .partial_cmp(&a.summary.performance_score)
            .unwrap_or(Ordering::Equal),
    };
    primary
        .then_with(|| b.summary.created_at.cmp(&a.summary.created_at))
        .then_with(|| a.summary.id.cmp(&b.summary.id))
}

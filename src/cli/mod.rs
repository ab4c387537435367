//! CLI command implementations

pub mod checkpoint;
pub mod history;
pub mod serve;
pub mod state;
pub mod workspace;

use chrono::{DateTime, Utc};

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M").to_string()
}

/// Cut `text` to `max` characters, marking the cut
fn truncate(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= max && !text.contains('\n') {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

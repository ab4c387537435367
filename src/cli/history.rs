//! `history`: print one conversation.

use anyhow::{Context, Result};

use kyco_sessions::services::Services;

use super::{format_time, truncate};

pub async fn history_command(
    services: &Services,
    workspace_id: &str,
    agent_id: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut messages = services
        .conversations
        .load(workspace_id, agent_id)
        .await
        .context("Failed to load conversation")?;

    if let Some(n) = limit {
        let skip = messages.len().saturating_sub(n);
        messages.drain(..skip);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!("No messages for {}/{}.", workspace_id, agent_id);
        return Ok(());
    }

    for message in &messages {
        let tools = message
            .metadata
            .as_ref()
            .map(|m| m.tool_uses.len())
            .unwrap_or(0);
        println!(
            "[{}] {:<9} {}{}",
            format_time(&message.timestamp),
            message.role.as_str(),
            truncate(&message.content, 100),
            if tools > 0 {
                format!("  ({} tool calls)", tools)
            } else {
                String::new()
            }
        );
    }

    println!();
    println!("Total: {} message(s)", messages.len());
    Ok(())
}

//! Checkpoint commands (save, list, show, search, delete, restore, reindex).

use anyhow::{Context, Result};

use kyco_sessions::Checkpoint;
use kyco_sessions::backend::WorkspaceDirectory;
use kyco_sessions::checkpoint::{SaveCheckpointRequest, SearchFilters, SearchPage, SearchQuery, SortBy};
use kyco_sessions::services::Services;

use crate::commands::CheckpointCommands;

use super::{format_time, truncate};

pub async fn checkpoint_command(services: &Services, command: CheckpointCommands) -> Result<()> {
    match command {
        CheckpointCommands::Save {
            workspace,
            agent,
            title,
            description,
            tags,
            summary,
            areas,
            context_type,
            agent_type,
            no_conversation,
            no_analytics,
            json,
        } => {
            let mut request = SaveCheckpointRequest::new(title);
            request.description = description;
            request.tags = tags;
            request.expertise_summary = summary;
            request.expertise_areas = (!areas.is_empty()).then_some(areas);
            request.context_type = context_type;
            request.agent_type = agent_type;
            request.include_full_conversation = !no_conversation;
            request.analytics_enabled = !no_analytics;
            save(services, &workspace, &agent, request, json).await
        }
        CheckpointCommands::List {
            limit,
            offset,
            json,
        } => {
            let page = services
                .checkpoints
                .list(limit, offset)
                .context("Failed to list checkpoints")?;
            print_page(&page, json)
        }
        CheckpointCommands::Show { id, json } => {
            let checkpoint = services.checkpoints.load(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&checkpoint)?);
                return Ok(());
            }
            print_checkpoint(&checkpoint);
            Ok(())
        }
        CheckpointCommands::Search {
            query,
            tags,
            areas,
            min_score,
            recent,
            mine,
            sort,
            limit,
            offset,
            json,
        } => {
            let query = SearchQuery {
                text: query,
                filters: SearchFilters {
                    tags,
                    expertise_areas: areas,
                    performance_threshold: min_score,
                    recently_used: recent,
                    my_checkpoints: mine,
                },
                sort_by: parse_sort(&sort)?,
                limit,
                offset,
            };
            let page = services
                .checkpoints
                .search(&query)
                .context("Failed to search checkpoints")?;
            print_page(&page, json)
        }
        CheckpointCommands::Delete { id } => {
            services.checkpoints.delete(&id).await?;
            println!("Deleted checkpoint {}", id);
            Ok(())
        }
        CheckpointCommands::Restore {
            id,
            workspace,
            agent,
            json,
        } => restore(services, &id, &workspace, &agent, json).await,
        CheckpointCommands::Reindex => {
            let count = services
                .checkpoints
                .reindex()
                .await
                .context("Failed to rebuild checkpoint index")?;
            println!("Indexed {} checkpoint(s)", count);
            Ok(())
        }
    }
}

async fn save(
    services: &Services,
    workspace_id: &str,
    agent_id: &str,
    request: SaveCheckpointRequest,
    json: bool,
) -> Result<()> {
    let id = services
        .checkpoints
        .save(workspace_id, agent_id, request)
        .await?;

    if json {
        println!("{}", serde_json::json!({ "checkpoint_id": id }));
    } else {
        println!("Saved checkpoint {}", id);
    }
    Ok(())
}

async fn restore(
    services: &Services,
    id: &str,
    workspace_id: &str,
    agent_id: &str,
    json: bool,
) -> Result<()> {
    if !services.workspaces.exists(workspace_id) {
        anyhow::bail!("Workspace not found: {}", workspace_id);
    }

    let (payload, seeded) = services
        .checkpoints
        .restore_into(id, workspace_id, agent_id)
        .await
        .with_context(|| format!("Failed to restore {} into {}/{}", id, workspace_id, agent_id))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "restore": payload,
                "messages_seeded": seeded,
            }))?
        );
        return Ok(());
    }

    println!(
        "Restored \"{}\" into {}/{} ({} message(s) seeded, used {} time(s))",
        payload.title, workspace_id, agent_id, seeded, payload.usage_count
    );
    Ok(())
}

fn parse_sort(value: &str) -> Result<SortBy> {
    match value.trim().to_lowercase().as_str() {
        "relevance" => Ok(SortBy::Relevance),
        "recency" | "recent" => Ok(SortBy::Recency),
        "performance" => Ok(SortBy::Performance),
        other => anyhow::bail!("Unknown sort order: {} (use relevance, recency or performance)", other),
    }
}

fn print_page(page: &SearchPage, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }

    if page.results.is_empty() {
        println!("No checkpoints found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<32} {:>5} {:>5} {:>5}  {}",
        "ID", "TITLE", "SCORE", "PERF", "USES", "TAGS"
    );
    println!("{}", "-".repeat(110));
    for hit in &page.results {
        let s = &hit.summary;
        println!(
            "{:<38} {:<32} {:>5} {:>5.2} {:>5}  {}",
            s.id,
            truncate(&s.title, 32),
            hit.score,
            s.performance_score,
            s.usage_count,
            s.tags.join(",")
        );
    }

    println!();
    println!(
        "Showing {}-{} of {}",
        page.offset + 1,
        page.offset + page.results.len(),
        page.total
    );
    Ok(())
}

fn print_checkpoint(cp: &Checkpoint) {
    let metrics = &cp.performance_metrics;
    println!("Checkpoint:    {}", cp.id);
    println!("Title:         {}", cp.title);
    if !cp.description.is_empty() {
        println!("Description:   {}", cp.description);
    }
    println!("Tags:          {}", cp.tags.join(", "));
    println!("Expertise:     {}", cp.expertise_areas.join(", "));
    println!("Agent Type:    {}", cp.agent_configuration.agent_type);
    println!(
        "Source:        {}/{}",
        cp.source_workspace_id, cp.source_agent_id
    );
    println!("Created:       {} by {}", format_time(&cp.created_at), cp.created_by);
    println!(
        "Last Used:     {}",
        cp.last_used
            .as_ref()
            .map(format_time)
            .unwrap_or_else(|| "never".to_string())
    );
    println!("Uses:          {}", cp.usage_count);
    println!("Completeness:  {:.0}%", cp.completeness * 100.0);
    println!(
        "Performance:   {:.2} ({} turns, {:.0}% success, {} tool calls)",
        metrics.performance_score,
        metrics.interaction_count,
        metrics.success_rate * 100.0,
        metrics.tool_use_count
    );
    println!(
        "Conversation:  {}",
        cp.full_conversation_state
            .as_ref()
            .map(|s| format!("{} message(s)", s.messages.len()))
            .unwrap_or_else(|| "not embedded".to_string())
    );
    if !cp.expertise_summary.is_empty() {
        println!();
        println!("{}", cp.expertise_summary);
    }
}

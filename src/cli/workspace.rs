//! `workspace add|remove|list`

use std::path::PathBuf;

use anyhow::{Context, Result};

use kyco_sessions::services::Services;

use crate::commands::WorkspaceCommands;

use super::format_time;

pub fn workspace_command(services: &Services, command: WorkspaceCommands) -> Result<()> {
    match command {
        WorkspaceCommands::Add { id, path } => add(services, &id, path),
        WorkspaceCommands::Remove { id } => remove(services, &id),
        WorkspaceCommands::List { json } => list(services, json),
    }
}

fn add(services: &Services, id: &str, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(p) => Some(
            p.canonicalize()
                .with_context(|| format!("Workspace path not found: {}", p.display()))?,
        ),
        None => None,
    };
    if services.workspaces.add(id, path)? {
        println!("Registered workspace {}", id);
    } else {
        println!("Workspace {} already registered", id);
    }
    Ok(())
}

fn remove(services: &Services, id: &str) -> Result<()> {
    match services.workspaces.remove(id)? {
        Some(_) => println!("Removed workspace {} (conversations kept)", id),
        None => anyhow::bail!("Workspace not found: {}", id),
    }
    Ok(())
}

fn list(services: &Services, json: bool) -> Result<()> {
    let workspaces = services.workspaces.list();
    if json {
        println!("{}", serde_json::to_string_pretty(&workspaces)?);
        return Ok(());
    }

    if workspaces.is_empty() {
        println!("No workspaces registered.");
        return Ok(());
    }

    println!("{:<24} {:<20} {:<17} {}", "ID", "NAME", "CREATED", "PATH");
    println!("{}", "-".repeat(90));
    for ws in &workspaces {
        println!(
            "{:<24} {:<20} {:<17} {}",
            ws.id,
            ws.name,
            format_time(&ws.created_at),
            ws.path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!();
    println!("Total: {} workspace(s)", workspaces.len());
    Ok(())
}

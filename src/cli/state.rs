//! `state`: show agent status and session tracking.

use anyhow::{Context, Result};

use kyco_sessions::AgentState;
use kyco_sessions::services::Services;

use super::format_time;

pub fn state_command(
    services: &Services,
    agent_id: Option<&str>,
    abandon_restore: bool,
    json: bool,
) -> Result<()> {
    let states: Vec<AgentState> = match agent_id {
        Some(id) if abandon_restore => {
            let state = services
                .sessions
                .abandon_restore(id)
                .with_context(|| format!("Failed to abandon restore of {}", id))?;
            vec![state]
        }
        Some(id) => {
            let state = services
                .sessions
                .get_state(id)
                .context("Failed to read agent state")?;
            let Some(state) = state else {
                anyhow::bail!("No state recorded for agent: {}", id);
            };
            vec![state]
        }
        None => services
            .sessions
            .list_states()
            .context("Failed to list agent states")?,
    };

    if json {
        match (agent_id, states.first()) {
            (Some(_), Some(state)) => println!("{}", serde_json::to_string_pretty(state)?),
            _ => println!("{}", serde_json::to_string_pretty(&states)?),
        }
        return Ok(());
    }

    if states.is_empty() {
        println!("No agents found.");
        return Ok(());
    }

    println!(
        "{:<24} {:<10} {:<17} {:>6}  {}",
        "AGENT", "STATUS", "LAST ACTIVE", "TURNS", "SESSION"
    );
    println!("{}", "-".repeat(90));
    for state in &states {
        println!(
            "{:<24} {:<10} {:<17} {:>6}  {}",
            state.id,
            state.status.as_str(),
            format_time(&state.last_activity),
            state.interaction_count,
            state.last_session_id.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

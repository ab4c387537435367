//! HTTP request handlers for the session API.

use std::path::PathBuf;
use std::thread;

use serde::Deserialize;
use tiny_http::{Response, StatusCode};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::stream::EventReader;
use super::{ApiState, header, parse_body, query_param, respond_error, respond_json};
use crate::backend::WorkspaceDirectory;
use crate::checkpoint::{SaveCheckpointRequest, SearchQuery};
use crate::error::SessionError;

/// Events buffered between a turn and its response writer
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
struct AddWorkspaceRequest {
    id: String,
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RestoreSessionRequest {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct RestoreCheckpointRequest {
    workspace_id: String,
    agent_id: String,
}

pub fn list_workspaces(state: &ApiState, request: tiny_http::Request) {
    let workspaces = state.services.workspaces.list();
    respond_json(request, 200, serde_json::json!({ "workspaces": workspaces }));
}

pub fn add_workspace(state: &ApiState, body: &str, request: tiny_http::Request) {
    let Some((req, request)) = parse_body::<AddWorkspaceRequest>(body, request) else {
        return;
    };
    match state.services.workspaces.add(&req.id, req.path) {
        Ok(created) => respond_json(
            request,
            if created { 201 } else { 200 },
            serde_json::json!({ "id": req.id, "created": created }),
        ),
        Err(e) => respond_error(request, &e),
    }
}

pub fn remove_workspace(state: &ApiState, workspace_id: &str, request: tiny_http::Request) {
    match state.services.workspaces.remove(workspace_id) {
        Ok(Some(workspace)) => respond_json(
            request,
            200,
            serde_json::json!({ "status": "removed", "workspace": workspace }),
        ),
        Ok(None) => respond_error(request, &SessionError::not_found("workspace", workspace_id)),
        Err(e) => respond_error(request, &e),
    }
}

pub fn get_messages(
    state: &ApiState,
    workspace_id: &str,
    agent_id: &str,
    request: tiny_http::Request,
) {
    let conversations = state.services.conversations.clone();
    let result = state
        .runtime
        .block_on(async { conversations.load(workspace_id, agent_id).await });
    match result {
        Ok(messages) => respond_json(
            request,
            200,
            serde_json::json!({
                "workspace_id": workspace_id,
                "agent_id": agent_id,
                "messages": messages,
            }),
        ),
        Err(e) => respond_error(request, &e),
    }
}

/// Run a turn and stream its events.
///
/// Rejections that happen before `start` (unknown workspace, busy agent, empty
/// content) still get a plain JSON error with the matching status code. Once
/// `start` is out, the response is `200` and any failure arrives as an
/// `error` event.
pub fn post_message(
    state: &ApiState,
    workspace_id: &str,
    agent_id: &str,
    body: &str,
    request: tiny_http::Request,
) {
    let Some((req, request)) = parse_body::<PostMessageRequest>(body, request) else {
        return;
    };

    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let runner = state.services.runner.clone();
    let (ws, agent) = (workspace_id.to_string(), agent_id.to_string());
    let turn = state
        .runtime
        .spawn(async move { runner.run(&ws, &agent, &req.content, tx).await });

    let Some(first) = rx.blocking_recv() else {
        // The turn ended without emitting anything, so it was rejected up front
        match state.runtime.block_on(turn) {
            Ok(Err(e)) => respond_error(request, &e),
            Ok(Ok(_)) => respond_json(request, 500, serde_json::json!({ "error": "no_events" })),
            Err(e) => {
                warn!("[kyco:sessions] Turn task failed: {}", e);
                respond_json(request, 500, serde_json::json!({ "error": "turn_failed" }));
            }
        }
        return;
    };

    info!(
        "[kyco:sessions] Streaming turn for {}/{}",
        workspace_id, agent_id
    );
    let headers: Vec<tiny_http::Header> = [
        header("Content-Type", "text/event-stream"),
        header("Cache-Control", "no-cache"),
    ]
    .into_iter()
    .flatten()
    .collect();

    // Writing the body blocks until the turn ends; keep the accept loop free
    thread::spawn(move || {
        let response = Response::new(
            StatusCode(200),
            headers,
            EventReader::new(first, rx),
            None,
            None,
        );
        if let Err(e) = request.respond(response) {
            warn!("[kyco:sessions] Client left during streamed turn: {}", e);
        }
    });
}

pub fn get_agent_state(state: &ApiState, agent_id: &str, request: tiny_http::Request) {
    match state.services.sessions.get_state(agent_id) {
        Ok(Some(agent)) => respond_json(request, 200, serde_json::json!({ "state": agent })),
        Ok(None) => respond_error(request, &SessionError::not_found("agent", agent_id)),
        Err(e) => respond_error(request, &e),
    }
}

pub fn restore_session(state: &ApiState, agent_id: &str, body: &str, request: tiny_http::Request) {
    let Some((req, request)) = parse_body::<RestoreSessionRequest>(body, request) else {
        return;
    };
    match state.services.sessions.restore(agent_id, &req.session_id) {
        Ok(outcome) => respond_json(request, 200, serde_json::json!(outcome)),
        Err(e) => respond_error(request, &e),
    }
}

pub fn abandon_restore(state: &ApiState, agent_id: &str, request: tiny_http::Request) {
    match state.services.sessions.abandon_restore(agent_id) {
        Ok(agent) => respond_json(request, 200, serde_json::json!({ "state": agent })),
        Err(e) => respond_error(request, &e),
    }
}

pub fn save_checkpoint(
    state: &ApiState,
    workspace_id: &str,
    agent_id: &str,
    body: &str,
    request: tiny_http::Request,
) {
    let Some((req, request)) = parse_body::<SaveCheckpointRequest>(body, request) else {
        return;
    };
    let checkpoints = state.services.checkpoints.clone();
    let result = state
        .runtime
        .block_on(async { checkpoints.save(workspace_id, agent_id, req).await });
    match result {
        Ok(id) => respond_json(request, 201, serde_json::json!({ "checkpoint_id": id })),
        Err(e) => respond_error(request, &e),
    }
}

pub fn list_checkpoints(state: &ApiState, query: &str, request: tiny_http::Request) {
    let limit = match query_param(query, "limit").map(str::parse::<usize>) {
        None => None,
        Some(Ok(limit)) => Some(limit),
        Some(Err(_)) => {
            respond_error(request, &SessionError::invalid("limit must be a number"));
            return;
        }
    };
    let offset = match query_param(query, "offset").map(str::parse::<usize>) {
        None => 0,
        Some(Ok(offset)) => offset,
        Some(Err(_)) => {
            respond_error(request, &SessionError::invalid("offset must be a number"));
            return;
        }
    };

    match state.services.checkpoints.list(limit, offset) {
        Ok(page) => respond_json(request, 200, serde_json::json!(page)),
        Err(e) => respond_error(request, &e),
    }
}

pub fn search_checkpoints(state: &ApiState, body: &str, request: tiny_http::Request) {
    let Some((query, request)) = parse_body::<SearchQuery>(body, request) else {
        return;
    };
    match state.services.checkpoints.search(&query) {
        Ok(page) => respond_json(request, 200, serde_json::json!(page)),
        Err(e) => respond_error(request, &e),
    }
}

pub fn get_checkpoint(state: &ApiState, id: &str, request: tiny_http::Request) {
    match state.services.checkpoints.load(id) {
        Ok(checkpoint) => respond_json(request, 200, serde_json::json!({ "checkpoint": checkpoint })),
        Err(e) => respond_error(request, &e),
    }
}

pub fn delete_checkpoint(state: &ApiState, id: &str, request: tiny_http::Request) {
    let checkpoints = state.services.checkpoints.clone();
    match state.runtime.block_on(async { checkpoints.delete(id).await }) {
        Ok(()) => respond_json(
            request,
            200,
            serde_json::json!({ "status": "deleted", "checkpoint_id": id }),
        ),
        Err(e) => respond_error(request, &e),
    }
}

/// Restore a checkpoint into a (possibly different) workspace and agent
pub fn restore_checkpoint(state: &ApiState, id: &str, body: &str, request: tiny_http::Request) {
    let Some((req, request)) = parse_body::<RestoreCheckpointRequest>(body, request) else {
        return;
    };
    if !state.services.workspaces.exists(&req.workspace_id) {
        respond_error(request, &SessionError::not_found("workspace", &req.workspace_id));
        return;
    }

    // Never wait on the target conversation here: this runs on the accept thread
    let checkpoints = state.services.checkpoints.clone();
    let result = state.runtime.block_on(async {
        checkpoints
            .restore_into(id, &req.workspace_id, &req.agent_id)
            .await
    });

    match result {
        Ok((payload, seeded)) => respond_json(
            request,
            200,
            serde_json::json!({ "restore": payload, "messages_seeded": seeded }),
        ),
        Err(e) => respond_error(request, &e),
    }
}

pub fn reindex_checkpoints(state: &ApiState, request: tiny_http::Request) {
    let checkpoints = state.services.checkpoints.clone();
    match state.runtime.block_on(async { checkpoints.reindex().await }) {
        Ok(count) => respond_json(request, 200, serde_json::json!({ "indexed": count })),
        Err(e) => respond_error(request, &e),
    }
}

//! Local HTTP API for sessions and checkpoints.
//!
//! Listens on localhost and accepts:
//! - Conversation history reads and streamed turns under `/workspaces/{ws}/agents/{agent}`
//! - Agent state and session restore under `/agents/{agent}`
//! - Checkpoint save, search, restore and maintenance under `/checkpoints`

mod handlers;
mod stream;

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tiny_http::{Response, Server};
use tracing::{error, info};

use crate::error::SessionError;
use crate::services::Services;

pub use stream::EventReader;

const AUTH_HEADER: &str = "X-KYCO-Token";
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024; // 2 MiB

/// Shared state for request handlers
#[derive(Clone)]
pub struct ApiState {
    pub services: Arc<Services>,
    /// Runtime the async stores and turns run on; the accept loop itself is a plain thread
    pub runtime: tokio::runtime::Handle,
}

/// A bound, not yet running API server
pub struct ApiServer {
    server: Server,
    addr: SocketAddr,
    auth_token: Option<String>,
}

impl ApiServer {
    /// Bind to `127.0.0.1:<port>`. Port 0 picks a free port.
    pub fn bind(port: u16, auth_token: Option<String>) -> Result<Self> {
        let bind_addr = format!("127.0.0.1:{}", port);
        let server = Server::http(&bind_addr)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Failed to start server on {}", bind_addr))?;
        let addr = server
            .server_addr()
            .to_ip()
            .context("Server is not listening on a TCP address")?;
        let auth_token = auth_token.filter(|t| !t.trim().is_empty());
        Ok(Self {
            server,
            addr,
            auth_token,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve requests until the process exits
    pub fn run(self, state: ApiState) {
        info!(
            "[kyco:sessions] Server listening on http://{} (auth: {})",
            self.addr,
            if self.auth_token.is_some() { "enabled" } else { "disabled" }
        );

        for mut request in self.server.incoming_requests() {
            let method = request.method().to_string();
            let url = request.url().to_string();
            let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

            if !is_authorized(&request, self.auth_token.as_deref()) {
                respond_json(request, 401, serde_json::json!({ "error": "unauthorized" }));
                continue;
            }

            let body = if method == "POST" {
                match read_request_body(&mut request) {
                    Ok(body) => body,
                    Err(response) => {
                        let _ = request.respond(response);
                        continue;
                    }
                }
            } else {
                String::new()
            };

            match (method.as_str(), segments.as_slice()) {
                ("GET", ["health"]) => {
                    respond_json(
                        request,
                        200,
                        serde_json::json!({
                            "status": "ok",
                            "version": env!("CARGO_PKG_VERSION"),
                        }),
                    );
                }

                // Workspaces
                ("GET", ["workspaces"]) => handlers::list_workspaces(&state, request),
                ("POST", ["workspaces"]) => handlers::add_workspace(&state, &body, request),
                ("DELETE", ["workspaces", ws]) => handlers::remove_workspace(&state, ws, request),

                // Conversations and turns
                ("GET", ["workspaces", ws, "agents", agent, "messages"]) => {
                    handlers::get_messages(&state, ws, agent, request);
                }
                ("POST", ["workspaces", ws, "agents", agent, "messages"]) => {
                    handlers::post_message(&state, ws, agent, &body, request);
                }

                // Agent sessions
                ("GET", ["agents", agent, "state"]) => {
                    handlers::get_agent_state(&state, agent, request);
                }
                ("POST", ["agents", agent, "restore"]) => {
                    handlers::restore_session(&state, agent, &body, request);
                }
                ("POST", ["agents", agent, "restore", "abandon"]) => {
                    handlers::abandon_restore(&state, agent, request);
                }

                // Checkpoints
                ("POST", ["workspaces", ws, "agents", agent, "checkpoints"]) => {
                    handlers::save_checkpoint(&state, ws, agent, &body, request);
                }
                ("GET", ["checkpoints"]) => handlers::list_checkpoints(&state, query, request),
                ("POST", ["checkpoints", "search"]) => {
                    handlers::search_checkpoints(&state, &body, request);
                }
                ("POST", ["checkpoints", "reindex"]) => {
                    handlers::reindex_checkpoints(&state, request);
                }
                ("GET", ["checkpoints", id]) => handlers::get_checkpoint(&state, id, request),
                ("DELETE", ["checkpoints", id]) => {
                    handlers::delete_checkpoint(&state, id, request);
                }
                ("POST", ["checkpoints", id, "restore"]) => {
                    handlers::restore_checkpoint(&state, id, &body, request);
                }

                _ => {
                    respond_json(request, 404, serde_json::json!({ "error": "not_found" }));
                }
            }
        }
    }
}

/// Start the HTTP server in a background thread
pub fn start_http_server(
    state: ApiState,
    port: u16,
    auth_token: Option<String>,
) -> Result<thread::JoinHandle<()>> {
    let server = ApiServer::bind(port, auth_token)?;
    Ok(thread::spawn(move || server.run(state)))
}

fn is_authorized(request: &tiny_http::Request, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(AUTH_HEADER))
        .map(|h| h.value.as_str() == expected)
        .unwrap_or(false)
}

fn header(name: &str, value: &str) -> Option<tiny_http::Header> {
    tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn json_response(status_code: u16, body: String) -> Response<std::io::Cursor<Vec<u8>>> {
    let response = Response::from_string(body).with_status_code(status_code);
    match header("Content-Type", "application/json") {
        Some(h) => response.with_header(h),
        None => response,
    }
}

fn read_request_body(
    request: &mut tiny_http::Request,
) -> std::result::Result<String, Response<std::io::Cursor<Vec<u8>>>> {
    let mut body = String::new();
    let mut reader = request.as_reader().take((MAX_BODY_BYTES + 1) as u64);
    if let Err(e) = reader.read_to_string(&mut body) {
        error!("[kyco:sessions] Failed to read body: {}", e);
        return Err(json_response(400, "{\"error\":\"bad_request\"}".to_string()));
    }

    if body.len() > MAX_BODY_BYTES {
        return Err(json_response(
            413,
            "{\"error\":\"payload_too_large\"}".to_string(),
        ));
    }

    Ok(body)
}

fn respond_json(request: tiny_http::Request, status_code: u16, value: serde_json::Value) {
    let body =
        serde_json::to_string(&value).unwrap_or_else(|_| "{\"error\":\"serialize\"}".to_string());
    let _ = request.respond(json_response(status_code, body));
}

fn respond_error(request: tiny_http::Request, err: &SessionError) {
    match err.status_code() {
        500.. => error!("[kyco:sessions] {}", err),
        _ => info!("[kyco:sessions] Rejected request: {}", err),
    }
    respond_json(request, err.status_code(), err.to_json());
}

/// Parse a JSON body, answering 400 on failure
fn parse_body<T: serde::de::DeserializeOwned>(
    body: &str,
    request: tiny_http::Request,
) -> Option<(T, tiny_http::Request)> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    match serde_json::from_str::<T>(body) {
        Ok(value) => Some((value, request)),
        Err(e) => {
            error!("[kyco:sessions] Invalid JSON: {}", e);
            respond_json(
                request,
                400,
                serde_json::json!({ "error": "invalid_json", "details": e.to_string() }),
            );
            None
        }
    }
}

/// Value of `key` in a `a=1&b=2` query string
fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

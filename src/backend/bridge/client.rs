//! Blocking HTTP client for the SDK bridge (NDJSON event streams).

use std::io::{BufRead, BufReader, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::events::BridgeEvent;

/// Query body understood by the bridge's `/<sdk>/query` endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct QueryRequest {
    pub prompt: String,
    pub cwd: String,
    /// Session to resume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct HealthResponse {
    pub status: String,
}

#[derive(Clone)]
pub(super) struct BridgeClient {
    base_url: String,
    agent: ureq::Agent,
}

impl BridgeClient {
    pub(super) fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(300))
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub(super) fn health_check(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        self.agent
            .get(&url)
            .call()
            .context("Failed to connect to bridge")?
            .into_json()
            .context("Failed to parse health response")
    }

    /// POST a query and return the event stream.
    ///
    /// Connection failures are retried up to 3 times (500ms, 1s backoff).
    pub(super) fn query(
        &self,
        sdk: &str,
        request: &QueryRequest,
    ) -> Result<EventStream<Box<dyn Read + Send + Sync + 'static>>> {
        let url = format!("{}/{}/query", self.base_url, sdk);

        const MAX_RETRIES: u32 = 3;
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.agent.post(&url).send_json(request) {
                Ok(response) => return Ok(EventStream::new(response.into_reader())),
                Err(e) => {
                    warn!("Bridge query attempt {}/{} failed: {}", attempt, MAX_RETRIES, e);
                    last_error = Some(e);
                    if attempt < MAX_RETRIES {
                        std::thread::sleep(Duration::from_millis(500 * (1 << (attempt - 1))));
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(e).with_context(|| {
                format!("Failed to start {sdk} query after {MAX_RETRIES} attempts")
            }),
            None => anyhow::bail!("Failed to start {sdk} query"),
        }
    }
}

/// Iterator over an NDJSON event stream.
///
/// Blank lines are skipped and lines that do not parse as an event are logged
/// and skipped; only read failures are yielded as errors.
pub(super) struct EventStream<R: Read> {
    reader: BufReader<R>,
    buffer: String,
}

impl<R: Read> EventStream<R> {
    pub(super) fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: String::new(),
        }
    }
}

impl<R: Read> Iterator for EventStream<R> {
    type Item = Result<BridgeEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {
                    let line = self.buffer.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<BridgeEvent>(line) {
                        Ok(event) => return Some(Ok(event)),
                        Err(e) => warn!("Skipping unparseable bridge event: {} (line: {})", e, line),
                    }
                }
                Err(e) => {
                    return Some(Err(anyhow::Error::new(e).context("Failed to read bridge stream")));
                }
            }
        }
    }
}

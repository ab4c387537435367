//! SDK bridge NDJSON events and their translation into stream units.

use serde::Deserialize;
use serde_json::json;

use crate::error::{Result, SessionError};
use crate::protocol::{MarkerKind, encode_marker};

/// Token usage as reported by the bridge (Claude and Codex field names)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    #[serde(alias = "input_tokens")]
    pub input_tokens: u64,
    #[serde(alias = "output_tokens")]
    pub output_tokens: u64,
    #[serde(default, alias = "cache_read_tokens")]
    pub cache_read_tokens: Option<u64>,
    /// Codex name for cache reads
    #[serde(default, alias = "cached_input_tokens")]
    pub cached_input_tokens: Option<u64>,
}

impl UsageStats {
    pub fn effective_cache_read(&self) -> u64 {
        self.cache_read_tokens.or(self.cached_input_tokens).unwrap_or(0)
    }
}

/// Bridge event. Kinds this crate does not use map to `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    #[serde(rename = "session.start")]
    SessionStart {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default)]
        model: String,
        #[serde(default)]
        tools: Vec<String>,
    },

    #[serde(rename = "text")]
    Text {
        content: String,
        /// Streaming preview; the final block repeats it with `partial: false`
        #[serde(default)]
        partial: bool,
    },

    #[serde(rename = "tool.use")]
    ToolUse {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "toolInput", default)]
        tool_input: serde_json::Value,
        #[serde(rename = "toolUseId", default)]
        tool_use_id: String,
    },

    #[serde(rename = "tool.result")]
    ToolResult {
        #[serde(rename = "toolUseId", default)]
        tool_use_id: String,
        success: bool,
        #[serde(default)]
        output: String,
        #[serde(rename = "filesChanged", default)]
        files_changed: Option<Vec<String>>,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },

    #[serde(rename = "session.complete")]
    SessionComplete {
        #[serde(rename = "sessionId")]
        session_id: String,
        success: bool,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        usage: Option<UsageStats>,
        #[serde(rename = "costUsd", default)]
        cost_usd: Option<f64>,
        #[serde(rename = "durationMs", default)]
        duration_ms: u64,
    },

    /// Heartbeats, approval requests, hooks
    #[serde(other)]
    Other,
}

/// Translate one bridge event into stream units.
///
/// Text becomes content, everything structured becomes a marker, and a bridge
/// error becomes a stream error that ends the turn.
pub fn event_units(event: BridgeEvent) -> Vec<Result<String>> {
    match event {
        BridgeEvent::SessionStart {
            session_id,
            model,
            tools,
        } => vec![Ok(encode_marker(
            MarkerKind::System,
            &json!({ "session_id": session_id, "model": model, "tools": tools }),
        ))],

        BridgeEvent::Text { content, partial } => {
            if partial || content.is_empty() {
                Vec::new()
            } else {
                vec![Ok(content)]
            }
        }

        BridgeEvent::ToolUse {
            tool_name,
            tool_input,
            tool_use_id,
        } => vec![Ok(encode_marker(
            MarkerKind::ToolUse,
            &json!({ "id": tool_use_id, "name": tool_name, "input": tool_input }),
        ))],

        BridgeEvent::ToolResult {
            tool_use_id,
            success,
            output,
            files_changed,
        } => vec![Ok(encode_marker(
            MarkerKind::ToolResult,
            &json!({
                "tool_use_id": tool_use_id,
                "success": success,
                "output": output,
                "files_changed": files_changed.unwrap_or_default(),
            }),
        ))],

        BridgeEvent::Error { message, code } => {
            let message = match code {
                Some(code) => format!("{message} ({code})"),
                None => message,
            };
            vec![Err(SessionError::Backend(message))]
        }

        BridgeEvent::SessionComplete {
            session_id,
            success,
            result,
            usage,
            cost_usd,
            duration_ms,
        } => {
            let mut units = Vec::with_capacity(2);
            if let Some(usage) = usage {
                units.push(Ok(encode_marker(
                    MarkerKind::Usage,
                    &json!({
                        "input_tokens": usage.input_tokens,
                        "output_tokens": usage.output_tokens,
                        "cache_read_tokens": usage.effective_cache_read(),
                    }),
                )));
            }
            units.push(Ok(encode_marker(
                MarkerKind::Result,
                &json!({
                    "session_id": session_id,
                    "success": success,
                    "result": result,
                    "cost_usd": cost_usd,
                    "duration_ms": duration_ms,
                }),
            )));
            units
        }

        BridgeEvent::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{StreamUnit, classify};

    fn parse(line: &str) -> BridgeEvent {
        serde_json::from_str(line).unwrap()
    }

    fn ok_units(event: BridgeEvent) -> Vec<String> {
        event_units(event).into_iter().map(|u| u.unwrap()).collect()
    }

    #[test]
    fn test_session_start_becomes_system_marker() {
        let units = ok_units(parse(
            r#"{"type":"session.start","sessionId":"s-1","timestamp":1,"model":"sonnet","tools":["Read","Edit"]}"#,
        ));
        assert_eq!(units.len(), 1);
        match classify(&units[0]) {
            StreamUnit::Metadata { kind, payload } => {
                assert_eq!(kind, MarkerKind::System);
                let value: serde_json::Value = serde_json::from_str(payload).unwrap();
                assert_eq!(value["session_id"], "s-1");
                assert_eq!(value["tools"][1], "Edit");
            }
            other => panic!("expected marker, got {:?}", other),
        }
    }

    #[test]
    fn test_only_final_text_is_content() {
        let partial = parse(r#"{"type":"text","sessionId":"s","timestamp":1,"content":"Hel","partial":true}"#);
        let full = parse(r#"{"type":"text","sessionId":"s","timestamp":2,"content":"Hello","partial":false}"#);
        assert!(ok_units(partial).is_empty());
        assert_eq!(ok_units(full), vec!["Hello"]);
    }

    #[test]
    fn test_tool_result_carries_changed_files() {
        let units = ok_units(parse(
            r#"{"type":"tool.result","sessionId":"s","timestamp":1,"toolUseId":"t1","success":true,"output":"ok","filesChanged":["a.rs"]}"#,
        ));
        assert!(units[0].starts_with("<<<TOOL_RESULT:"));
        assert!(units[0].contains("\"files_changed\":[\"a.rs\"]"));
    }

    #[test]
    fn test_complete_yields_usage_then_result() {
        let units = ok_units(parse(
            r#"{"type":"session.complete","sessionId":"s","timestamp":1,"success":true,"usage":{"inputTokens":10,"outputTokens":3,"cachedInputTokens":4},"durationMs":900}"#,
        ));
        assert_eq!(units.len(), 2);
        assert!(units[0].starts_with("<<<USAGE:"));
        assert!(units[0].contains("\"cache_read_tokens\":4"));
        assert!(units[1].starts_with("<<<RESULT:"));
    }

    #[test]
    fn test_error_and_unknown_events() {
        let units = event_units(parse(
            r#"{"type":"error","sessionId":"s","timestamp":1,"message":"rate limited","code":"429"}"#,
        ));
        assert!(matches!(&units[0], Err(SessionError::Backend(m)) if m == "rate limited (429)"));

        let heartbeat = parse(r#"{"type":"heartbeat","sessionId":"s","timestamp":1}"#);
        assert!(event_units(heartbeat).is_empty());
    }
}

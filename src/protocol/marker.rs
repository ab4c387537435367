//! Inline control markers: `<<<TYPE:jsonPayload>>>`.

use once_cell::sync::Lazy;
use regex::Regex;

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*<<<(SYSTEM|USAGE|TOOL_USE|TOOL_RESULT|RESULT):(.*)>>>\s*$")
        .expect("marker pattern is valid")
});

/// Kind of metadata a marker carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Session id and available tools
    System,
    Usage,
    ToolUse,
    ToolResult,
    Result,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::System => "SYSTEM",
            MarkerKind::Usage => "USAGE",
            MarkerKind::ToolUse => "TOOL_USE",
            MarkerKind::ToolResult => "TOOL_RESULT",
            MarkerKind::Result => "RESULT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SYSTEM" => Some(MarkerKind::System),
            "USAGE" => Some(MarkerKind::Usage),
            "TOOL_USE" => Some(MarkerKind::ToolUse),
            "TOOL_RESULT" => Some(MarkerKind::ToolResult),
            "RESULT" => Some(MarkerKind::Result),
            _ => None,
        }
    }
}

impl std::fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of backend output after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamUnit<'a> {
    /// Ordinary assistant text
    Content(&'a str),
    /// Control marker with its raw (not yet decoded) JSON payload
    Metadata { kind: MarkerKind, payload: &'a str },
}

/// Classify a unit as content or metadata.
///
/// A unit is metadata only if the whole unit (ignoring surrounding
/// whitespace) has the marker shape with a known type.
pub fn classify(unit: &str) -> StreamUnit<'_> {
    let Some(caps) = MARKER_RE.captures(unit) else {
        return StreamUnit::Content(unit);
    };

    match (caps.get(1), caps.get(2)) {
        (Some(kind), Some(payload)) => match MarkerKind::parse(kind.as_str()) {
            Some(kind) => StreamUnit::Metadata {
                kind,
                payload: payload.as_str(),
            },
            None => StreamUnit::Content(unit),
        },
        _ => StreamUnit::Content(unit),
    }
}

/// Render a marker unit. Inverse of [`classify`].
pub fn encode_marker(kind: MarkerKind, payload: &serde_json::Value) -> String {
    format!("<<<{}:{}>>>", kind.as_str(), payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_then_classify_yields_payload() {
        let payload = json!({"name": "grep", "input": {"pattern": "fn main"}});
        let unit = encode_marker(MarkerKind::ToolUse, &payload);
        assert!(unit.starts_with("<<<TOOL_USE:{"));
        assert!(unit.ends_with("}>>>"));

        match classify(&unit) {
            StreamUnit::Metadata { kind, payload: raw } => {
                assert_eq!(kind, MarkerKind::ToolUse);
                let decoded: serde_json::Value = serde_json::from_str(raw).unwrap();
                assert_eq!(decoded, payload);
            }
            other => panic!("expected metadata, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_is_content() {
        assert_eq!(classify("hello world"), StreamUnit::Content("hello world"));
        assert_eq!(classify("<<<"), StreamUnit::Content("<<<"));
    }

    #[test]
    fn test_unknown_marker_type_is_content() {
        let unit = r#"<<<THINKING:{"a":1}>>>"#;
        assert_eq!(classify(unit), StreamUnit::Content(unit));
    }

    #[test]
    fn test_marker_embedded_in_text_is_content() {
        let unit = r#"see <<<USAGE:{"input_tokens":1}>>> here"#;
        assert_eq!(classify(unit), StreamUnit::Content(unit));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let unit = "  <<<SYSTEM:{\"session_id\":\"s1\"}>>>\n";
        assert!(matches!(
            classify(unit),
            StreamUnit::Metadata { kind: MarkerKind::System, .. }
        ));
    }

    #[test]
    fn test_multiline_payload() {
        let unit = "<<<RESULT:{\n  \"success\": true\n}>>>";
        match classify(unit) {
            StreamUnit::Metadata { kind, payload } => {
                assert_eq!(kind, MarkerKind::Result);
                assert!(payload.contains("\"success\": true"));
            }
            other => panic!("expected metadata, got {:?}", other),
        }
    }
}

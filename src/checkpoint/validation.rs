//! Checkpoint request validation and completeness scoring.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::SaveCheckpointRequest;
use crate::SdkType;
use crate::config::CheckpointSettings;
use crate::error::{Result, SessionError};

const MAX_SUMMARY_LEN: usize = 4000;

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_.+#-]*$").expect("tag pattern is valid"));

/// Outcome of validating a save request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Share of optional content present (0.0 - 1.0)
    pub completeness: f64,
    /// Every violated constraint, in field order
    pub violations: Vec<String>,
}

impl ValidationReport {
    pub fn into_result(self) -> Result<f64> {
        if self.valid {
            Ok(self.completeness)
        } else {
            Err(SessionError::validation(self.violations))
        }
    }
}

/// Check a request against every rule and collect all violations.
///
/// `has_conversation` is whether a non-empty conversation would be embedded.
pub fn validate_request(
    request: &SaveCheckpointRequest,
    settings: &CheckpointSettings,
    has_conversation: bool,
) -> ValidationReport {
    let mut violations = Vec::new();

    let title_len = request.title.trim().chars().count();
    if title_len == 0 {
        violations.push("title is required".to_string());
    } else if title_len < settings.min_title_len {
        violations.push(format!(
            "title must be at least {} characters",
            settings.min_title_len
        ));
    } else if title_len > settings.max_title_len {
        violations.push(format!(
            "title must be at most {} characters",
            settings.max_title_len
        ));
    }

    if SdkType::parse(&request.agent_type).is_none() {
        let known: Vec<_> = SdkType::ALL.iter().map(|t| t.as_str()).collect();
        violations.push(format!(
            "unknown agent type '{}' (expected one of: {})",
            request.agent_type,
            known.join(", ")
        ));
    }

    if request.tags.len() > settings.max_tags {
        violations.push(format!(
            "at most {} tags allowed, got {}",
            settings.max_tags,
            request.tags.len()
        ));
    }
    let mut seen = HashSet::new();
    for tag in request.normalized_tags() {
        if tag.is_empty() {
            violations.push("tags must not be empty".to_string());
            continue;
        }
        if tag.chars().count() > settings.max_tag_len {
            violations.push(format!(
                "tag '{}' exceeds {} characters",
                tag, settings.max_tag_len
            ));
        } else if !TAG_RE.is_match(&tag) {
            violations.push(format!(
                "tag '{}' may only contain a-z, 0-9 and _ . + # - and must start with a letter or digit",
                tag
            ));
        }
        if !seen.insert(tag.clone()) {
            violations.push(format!("duplicate tag '{}'", tag));
        }
    }

    if request.expertise_summary.chars().count() > MAX_SUMMARY_LEN {
        violations.push(format!(
            "expertise summary must be at most {} characters",
            MAX_SUMMARY_LEN
        ));
    }

    ValidationReport {
        valid: violations.is_empty(),
        completeness: completeness(request, has_conversation),
        violations,
    }
}

fn completeness(request: &SaveCheckpointRequest, has_conversation: bool) -> f64 {
    let present = [
        !request.title.trim().is_empty(),
        !request.description.trim().is_empty(),
        !request.tags.is_empty(),
        !request.expertise_summary.trim().is_empty(),
        !request.resolved_expertise_areas().is_empty(),
        has_conversation,
    ];
    present.iter().filter(|p| **p).count() as f64 / present.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CheckpointSettings {
        CheckpointSettings::default()
    }

    #[test]
    fn test_valid_request() {
        let mut request = SaveCheckpointRequest::new("Async parser rewrite");
        request.description = "Moved the tokenizer to tokio".into();
        request.tags = vec!["rust".into(), "tokio".into(), "c++".into(), "c#".into()];
        request.expertise_summary = "Knows the lexer".into();

        let report = validate_request(&request, &settings(), true);
        assert!(report.valid, "{:?}", report.violations);
        assert_eq!(report.completeness, 1.0);
    }

    #[test]
    fn test_reports_every_violation() {
        let mut request = SaveCheckpointRequest::new("ab");
        request.agent_type = "copilot".into();
        request.tags = vec!["ok".into(), "Has Space".into(), "ok".into(), "-dash".into()];

        let report = validate_request(&request, &settings(), false);
        assert!(!report.valid);
        assert_eq!(report.violations.len(), 5, "{:?}", report.violations);
        assert!(report.violations[0].contains("at least 3"));
        assert!(report.violations[1].contains("copilot"));

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, SessionError::Validation { ref violations } if violations.len() == 5));
    }

    #[test]
    fn test_tag_limits() {
        let mut request = SaveCheckpointRequest::new("Tag limits");
        request.tags = (0..13).map(|i| format!("t{i}")).collect();
        request.tags.push("x".repeat(40));

        let report = validate_request(&request, &settings(), false);
        assert_eq!(report.violations.len(), 2, "{:?}", report.violations);
    }

    #[test]
    fn test_completeness_counts_present_fields() {
        let request = SaveCheckpointRequest::new("Only a title");
        let report = validate_request(&request, &settings(), false);
        assert!(report.valid);
        assert!((report.completeness - 1.0 / 6.0).abs() < 1e-9);
    }
}

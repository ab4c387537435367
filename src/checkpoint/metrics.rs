use serde_json::Value;

use crate::{AgentState, ConversationMessage, PerformanceMetrics, Role};

/// Turns after which engagement stops adding to the performance score
const ENGAGEMENT_TURNS: f64 = 10.0;

/// Derive performance metrics from an agent's state and conversation.
///
/// `performance_score` weighs the reported success rate (70%) against how far
/// the agent got into the conversation (30%, saturating at ten turns).
pub fn derive_metrics(state: Option<&AgentState>, messages: &[ConversationMessage]) -> PerformanceMetrics {
    let mut metrics = PerformanceMetrics::default();
    let mut reported = 0usize;
    let mut succeeded = 0usize;

    for message in messages {
        match message.role {
            Role::User => metrics.user_messages += 1,
            Role::Assistant => metrics.assistant_messages += 1,
            Role::System => {}
        }

        let Some(metadata) = &message.metadata else {
            continue;
        };
        metrics.tool_use_count = metrics.tool_use_count.saturating_add(metadata.tool_uses.len());
        metrics.tool_result_count = metrics.tool_result_count.saturating_add(metadata.tool_results.len());
        if let Some(success) = metadata.success {
            reported += 1;
            if success {
                succeeded += 1;
            }
        }
        if let Some(usage) = &metadata.usage {
            // Stored usage is untrusted input
            metrics.input_tokens = metrics
                .input_tokens
                .saturating_add(token_count(usage, &["input_tokens", "inputTokens"]));
            metrics.output_tokens = metrics
                .output_tokens
                .saturating_add(token_count(usage, &["output_tokens", "outputTokens"]));
        }
    }

    metrics.interaction_count = state
        .map(|s| s.interaction_count)
        .unwrap_or(metrics.user_messages as u64);
    if reported > 0 {
        metrics.success_rate = succeeded as f64 / reported as f64;
    }

    let engagement = (metrics.interaction_count as f64 / ENGAGEMENT_TURNS).min(1.0);
    metrics.performance_score = (0.7 * metrics.success_rate + 0.3 * engagement).clamp(0.0, 1.0);
    metrics
}

fn token_count(usage: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|key| usage.get(*key).and_then(Value::as_u64))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageMetadata;
    use serde_json::json;

    fn assistant(success: Option<bool>, tools: usize, usage: Value) -> ConversationMessage {
        ConversationMessage::assistant("done").with_metadata(MessageMetadata {
            tool_uses: (0..tools).map(|i| json!({"name": format!("tool{i}")})).collect(),
            usage: Some(usage),
            success,
            ..Default::default()
        })
    }

    #[test]
    fn test_counts_and_tokens() {
        let messages = vec![
            ConversationMessage::user("one"),
            assistant(Some(true), 2, json!({"input_tokens": 100, "output_tokens": 20})),
            ConversationMessage::user("two"),
            assistant(Some(false), 1, json!({"inputTokens": 50, "outputTokens": 5})),
        ];

        let metrics = derive_metrics(None, &messages);
        assert_eq!(metrics.user_messages, 2);
        assert_eq!(metrics.assistant_messages, 2);
        assert_eq!(metrics.interaction_count, 2);
        assert_eq!(metrics.tool_use_count, 3);
        assert_eq!(metrics.input_tokens, 150);
        assert_eq!(metrics.output_tokens, 25);
        assert_eq!(metrics.success_rate, 0.5);
        assert!((metrics.performance_score - (0.35 + 0.06)).abs() < 1e-9);
    }

    #[test]
    fn test_state_interaction_count_wins() {
        let mut state = AgentState::new("agent");
        state.interaction_count = 40;
        let messages = vec![assistant(Some(true), 0, json!({}))];

        let metrics = derive_metrics(Some(&state), &messages);
        assert_eq!(metrics.interaction_count, 40);
        assert!((metrics.performance_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_huge_token_counts_saturate() {
        let messages = vec![
            assistant(None, 0, json!({"input_tokens": u64::MAX, "output_tokens": u64::MAX})),
            assistant(None, 0, json!({"input_tokens": u64::MAX, "output_tokens": 1})),
        ];

        let metrics = derive_metrics(None, &messages);
        assert_eq!(metrics.input_tokens, u64::MAX);
        assert_eq!(metrics.output_tokens, u64::MAX);
    }

    #[test]
    fn test_empty_conversation() {
        let metrics = derive_metrics(None, &[]);
        assert_eq!(metrics, PerformanceMetrics::default());
    }
}

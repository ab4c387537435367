//! Integration tests for turns: persistence, metadata separation and session tracking

mod common;

use common::{Reply, TestEnv, result_marker, system_marker, tool_use_marker};
use kyco_sessions::protocol::StreamEvent;
use kyco_sessions::{AgentStatus, Role, SessionError};

#[tokio::test]
async fn test_streamed_turn_persists_user_and_assistant() {
    let env = TestEnv::new();
    env.add_workspace("W");
    env.backend.push(Reply::units([
        "Looking ".to_string(),
        "at the ".to_string(),
        tool_use_marker("grep"),
        "code ".to_string(),
        "now.".to_string(),
    ]));

    let (outcome, events) = env.turn("W", "A", "hello").await;
    let outcome = outcome.expect("turn should run");
    assert!(outcome.is_success());

    let messages = env.services.conversations.load("W", "A").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Looking at the code now.");
    assert!(!messages[1].content.contains("<<<"));

    let metadata = messages[1].metadata.as_ref().expect("assistant metadata");
    assert_eq!(metadata.tool_uses.len(), 1);
    assert_eq!(metadata.tool_uses[0]["name"], "grep");

    // start, five chunks (the marker included), complete
    assert_eq!(events.len(), 7);
    assert_eq!(events[0], StreamEvent::Start);
    assert!(events[1..6].iter().all(|e| e.kind() == "chunk"));
    assert_eq!(
        events[6],
        StreamEvent::Complete {
            message_id: messages[1].id.clone()
        }
    );
}

#[tokio::test]
async fn test_session_id_is_recorded_and_offered_on_next_turn() {
    let env = TestEnv::new();
    env.add_workspace("W");
    env.backend.push(Reply::units([
        system_marker("sess-42"),
        "first answer".to_string(),
        result_marker(true),
    ]));

    let (outcome, _) = env.turn("W", "A", "first").await;
    assert_eq!(outcome.unwrap().session_id.as_deref(), Some("sess-42"));

    let state = env.services.sessions.get_state("A").unwrap().unwrap();
    assert_eq!(state.status, AgentStatus::Idle);
    assert_eq!(state.last_session_id.as_deref(), Some("sess-42"));
    assert_eq!(state.interaction_count, 1);

    let (outcome, _) = env.turn("W", "A", "second").await;
    assert!(outcome.unwrap().is_success());

    let requests = env.backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].resume_session_id, None);
    assert_eq!(requests[1].resume_session_id.as_deref(), Some("sess-42"));
    // History handed to the backend excludes the new prompt
    assert_eq!(requests[1].history.len(), 2);
    assert_eq!(requests[1].prompt, "second");

    let messages = env.services.conversations.load("W", "A").await.unwrap();
    assert_eq!(messages.len(), 4);
    let metadata = messages[1].metadata.as_ref().unwrap();
    assert_eq!(metadata.success, Some(true));
    assert_eq!(metadata.available_tools, vec!["Read", "Grep"]);
}

#[tokio::test]
async fn test_unknown_workspace_writes_nothing() {
    let env = TestEnv::new();

    let (outcome, events) = env.turn("missing", "A", "hello").await;
    assert!(matches!(outcome, Err(SessionError::NotFound { .. })));
    assert!(events.is_empty());
    assert!(env.services.conversations.load("missing", "A").await.unwrap().is_empty());
    assert!(env.services.sessions.get_state("A").unwrap().is_none());
}

#[tokio::test]
async fn test_backend_failure_keeps_user_message() {
    let env = TestEnv::new();
    env.add_workspace("W");
    env.backend.push(Reply::Fail("bridge not running".to_string()));

    let (outcome, events) = env.turn("W", "A", "hello").await;
    let outcome = outcome.unwrap();
    assert!(outcome.error.as_deref().unwrap().contains("bridge not running"));
    assert_eq!(outcome.assistant_message_id, None);

    assert_eq!(events.first(), Some(&StreamEvent::Start));
    assert_eq!(events.last().map(|e| e.kind()), Some("error"));

    let messages = env.services.conversations.load("W", "A").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);

    let state = env.services.sessions.get_state("A").unwrap().unwrap();
    assert_eq!(state.status, AgentStatus::Idle);
    // No answer was recorded, so this was not an interaction
    assert_eq!(state.interaction_count, 0);
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_partial_answer() {
    let env = TestEnv::new();
    env.add_workspace("W");
    env.backend.push(Reply::Units(vec![
        Ok("partial ".to_string()),
        Ok("answer".to_string()),
        Err("connection reset".to_string()),
    ]));

    let (outcome, events) = env.turn("W", "A", "hello").await;
    let outcome = outcome.unwrap();
    assert!(!outcome.is_success());
    assert!(outcome.assistant_message_id.is_some());
    assert_eq!(events.last().map(|e| e.kind()), Some("error"));

    let messages = env.services.conversations.load("W", "A").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "partial answer");
    assert_eq!(messages[1].metadata.as_ref().unwrap().success, Some(false));

    // A partial answer still counts as an exchange
    let state = env.services.sessions.get_state("A").unwrap().unwrap();
    assert_eq!(state.interaction_count, 1);
}

#[tokio::test]
async fn test_conversations_are_isolated_per_workspace_and_agent() {
    let env = TestEnv::new();
    env.add_workspace("W1");
    env.add_workspace("W2");

    env.turn("W1", "A", "one").await.0.unwrap();
    env.turn("W2", "A", "two").await.0.unwrap();
    env.turn("W1", "B", "three").await.0.unwrap();

    let w1a = env.services.conversations.load("W1", "A").await.unwrap();
    let w2a = env.services.conversations.load("W2", "A").await.unwrap();
    let w1b = env.services.conversations.load("W1", "B").await.unwrap();
    assert_eq!(w1a[0].content, "one");
    assert_eq!(w2a[0].content, "two");
    assert_eq!(w1b[0].content, "three");
    assert_eq!(w1a.len() + w2a.len() + w1b.len(), 6);

    // One agent state shared across workspaces
    let state = env.services.sessions.get_state("A").unwrap().unwrap();
    assert_eq!(state.interaction_count, 2);
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let env = TestEnv::new();
    env.add_workspace("W");
    env.turn("W", "A", "remember me").await.0.unwrap();

    // Fresh services over the same directory, as after a restart
    let reopened = kyco_sessions::services::Services::with_backend(
        kyco_sessions::config::Config::with_data_dir(env.dir.path()),
        std::sync::Arc::new(common::ScriptedBackend::default()),
    )
    .unwrap();
    let report = reopened.recover().await.unwrap();
    assert_eq!(report.agents_reset, 0);

    let messages = reopened.conversations.load("W", "A").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "remember me");
    assert!(reopened.workspaces.get("W").is_some());
}

#[tokio::test]
async fn test_workspace_registered_by_another_process_accepts_turns() {
    let env = TestEnv::new();
    assert!(matches!(
        env.turn("late", "A", "hello").await.0,
        Err(SessionError::NotFound { .. })
    ));

    // The CLI opens its own services over the same data directory
    let cli = kyco_sessions::services::Services::with_backend(
        kyco_sessions::config::Config::with_data_dir(env.dir.path()),
        std::sync::Arc::new(common::ScriptedBackend::default()),
    )
    .unwrap();
    cli.workspaces.add("late", None).unwrap();

    let (outcome, _) = env.turn("late", "A", "hello").await;
    assert!(outcome.unwrap().is_success());

    cli.workspaces.remove("late").unwrap();
    assert!(matches!(
        env.turn("late", "A", "again").await.0,
        Err(SessionError::NotFound { .. })
    ));
}

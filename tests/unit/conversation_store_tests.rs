//! Unit tests for the in-memory conversation store.

use std::time::Duration;

use pilot_orchestrator::conversation::ConversationStore;
use pilot_orchestrator::models::intent::Intent;
use pilot_orchestrator::models::message::Role;

fn store(max: usize) -> ConversationStore {
    ConversationStore::new(max, Duration::from_secs(1800))
}

/// History is kept in insertion order with roles and intents.
#[test]
fn history_keeps_insertion_order() {
    let store = store(10);
    store.add_user_message("c1", "fix the login bug", Some(Intent::Task));
    store.add_assistant_message("c1", "Proposed TG-1");
    store.add_user_message("c1", "yes", None);

    let history = store.history("c1");
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].intent, Some(Intent::Task));
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "Proposed TG-1");
    assert_eq!(history[2].content, "yes");
}

/// Exceeding the size bound drops the oldest messages first.
#[test]
fn oldest_messages_are_trimmed() {
    let store = store(3);
    for i in 0..5 {
        store.add_user_message("c1", &format!("message {i}"), None);
    }

    let contents: Vec<String> = store.history("c1").into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);
}

/// Returned history is a copy; later writes do not change it.
#[test]
fn history_is_a_snapshot() {
    let store = store(10);
    store.add_user_message("c1", "first", None);
    let snapshot = store.history("c1");

    store.add_user_message("c1", "second", None);

    assert_eq!(snapshot.len(), 1);
    assert_eq!(store.history("c1").len(), 2);
}

/// Unknown conversations have empty history and no summary.
#[test]
fn unknown_conversation_is_empty() {
    let store = store(10);
    assert!(store.history("nobody").is_empty());
    assert!(store.context_summary("nobody", 5).is_empty());
    assert_eq!(store.last_user_intent("nobody"), None);
    assert_eq!(store.last_assistant_message("nobody"), None);
}

/// Conversations are isolated from each other.
#[test]
fn conversations_are_isolated() {
    let store = store(10);
    store.add_user_message("c1", "hello", Some(Intent::Greeting));
    store.add_user_message("c2", "add tests", Some(Intent::Task));

    assert_eq!(store.history("c1").len(), 1);
    assert_eq!(store.last_user_intent("c2"), Some(Intent::Task));
    assert_eq!(store.len(), 2);
}

/// The summary renders the last `limit` messages as `Role: content` lines.
#[test]
fn context_summary_renders_recent_lines() {
    let store = store(10);
    store.add_user_message("c1", "old message", None);
    store.add_user_message("c1", "what handles auth?", Some(Intent::Question));
    store.add_assistant_message("c1", "The auth module\nin src/auth.rs");

    let summary = store.context_summary("c1", 2);
    assert_eq!(
        summary,
        "User: what handles auth?\nAssistant: The auth module in src/auth.rs\n"
    );
}

/// Long entries are truncated in the summary.
#[test]
fn context_summary_truncates_long_content() {
    let store = store(10);
    store.add_user_message("c1", &"x".repeat(500), None);

    let summary = store.context_summary("c1", 5);
    assert!(summary.starts_with("User: "));
    assert!(summary.trim_end().ends_with("..."));
    assert!(summary.chars().count() < 300);
}

/// The last user intent skips messages recorded without one.
#[test]
fn last_user_intent_skips_untagged_messages() {
    let store = store(10);
    store.add_user_message("c1", "refactor the parser", Some(Intent::Task));
    store.add_assistant_message("c1", "Proposed");
    store.add_user_message("c1", "yes", None);

    assert_eq!(store.last_user_intent("c1"), Some(Intent::Task));
}

/// The last assistant message is the newest assistant entry.
#[test]
fn last_assistant_message_is_newest() {
    let store = store(10);
    store.add_assistant_message("c1", "first answer");
    store.add_user_message("c1", "and then?", Some(Intent::Question));
    store.add_assistant_message("c1", "second answer");
    store.add_user_message("c1", "thanks", Some(Intent::Chat));

    assert_eq!(
        store.last_assistant_message("c1").as_deref(),
        Some("second answer")
    );
}

/// Clearing one conversation leaves the others alone.
#[test]
fn clear_removes_one_conversation() {
    let store = store(10);
    store.add_user_message("c1", "a", None);
    store.add_user_message("c2", "b", None);

    store.clear("c1");
    assert!(store.history("c1").is_empty());
    assert_eq!(store.history("c2").len(), 1);

    store.clear_all();
    assert!(store.is_empty());
}

/// Sweeping drops conversations idle longer than the TTL.
#[tokio::test]
async fn sweep_drops_idle_conversations() {
    let store = ConversationStore::new(10, Duration::from_millis(50));
    store.add_user_message("stale", "old", None);
    tokio::time::sleep(Duration::from_millis(120)).await;
    store.add_user_message("fresh", "new", None);

    let removed = store.sweep_expired();
    assert_eq!(removed, 1);
    assert!(store.history("stale").is_empty());
    assert_eq!(store.history("fresh").len(), 1);
}

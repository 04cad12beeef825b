//! Unit tests for the line-oriented console transport.

use pilot_orchestrator::transport::console::{parse_line, render, ConsoleMessenger, LOCAL_ID};
use pilot_orchestrator::transport::{Messenger, Reply};

// ── parse_line ───────────────────────────────────────────

#[test]
fn plain_lines_use_local_identity() {
    let message = parse_line("  fix the login bug ").expect("message");
    assert_eq!(message.conversation_id, LOCAL_ID);
    assert_eq!(message.sender_id, LOCAL_ID);
    assert_eq!(message.text, "fix the login bug");
}

#[test]
fn addressed_lines_carry_conversation() {
    let message = parse_line("@team-chat what handles auth?").expect("message");
    assert_eq!(message.conversation_id, "team-chat");
    assert_eq!(message.sender_id, "team-chat");
    assert_eq!(message.text, "what handles auth?");
}

#[test]
fn addressed_lines_carry_sender() {
    let message = parse_line("@team-chat:user-7 yes").expect("message");
    assert_eq!(message.conversation_id, "team-chat");
    assert_eq!(message.sender_id, "user-7");
    assert_eq!(message.text, "yes");
}

#[test]
fn blank_and_empty_addressed_lines_are_skipped() {
    assert!(parse_line("   ").is_none());
    assert!(parse_line("@team-chat").is_none());
    assert!(parse_line("@ hello").is_none());
}

// ── render ───────────────────────────────────────────────

#[test]
fn renders_confirmation_prompt() {
    let text = render(&Reply::Confirmation {
        task_id: "TG-1".into(),
        description: "Add retries".into(),
        project: "/work/app".into(),
    });
    assert!(text.starts_with("Task TG-1 (/work/app)"));
    assert!(text.contains("Add retries"));
    assert!(text.ends_with("Reply yes to execute or no to cancel."));
}

#[test]
fn renders_progress_line() {
    let text = render(&Reply::Progress {
        edit: Some("3".into()),
        task_id: "TG-1".into(),
        phase: "Testing".into(),
        percent: 60,
        detail: "cargo test".into(),
    });
    assert_eq!(text, "[TG-1] Testing 60% cargo test");
}

#[test]
fn renders_result_with_artifact() {
    let text = render(&Reply::Result {
        task_id: "TG-1".into(),
        success: true,
        output: "all green".into(),
        artifact_url: Some("https://github.com/acme/app/pull/4".into()),
    });
    assert_eq!(
        text,
        "Task TG-1 completed\nall green\nPR: https://github.com/acme/app/pull/4"
    );
}

#[test]
fn renders_failed_result() {
    let text = render(&Reply::Result {
        task_id: "TG-2".into(),
        success: false,
        output: "boom".into(),
        artifact_url: None,
    });
    assert_eq!(text, "Task TG-2 failed\nboom");
}

// ── ConsoleMessenger ─────────────────────────────────────

/// Each reply is written as one tagged block and gets a fresh reference.
#[tokio::test]
async fn messenger_writes_tagged_blocks() {
    let (writer, mut reader) = tokio::io::duplex(4096);
    let messenger = ConsoleMessenger::new(writer);

    let first = messenger
        .send("chat-1", Reply::text("hello"))
        .await
        .expect("send");
    let second = messenger
        .send("chat-1", Reply::text("again"))
        .await
        .expect("send");
    assert_ne!(first, second);
    drop(messenger);

    let mut out = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut out)
        .await
        .expect("read output");
    assert_eq!(out, "[chat-1] hello\n[chat-1] again\n");
}

//! Integration tests for service assembly, console intake, and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use pilot_orchestrator::classifier::RemoteClassifier;
use pilot_orchestrator::driver::Executor;
use pilot_orchestrator::service::{Collaborators, Orchestrator};
use pilot_orchestrator::store::{HistoryStore, MemoryHistoryStore};
use pilot_orchestrator::transport::console::run_intake;
use pilot_orchestrator::transport::Messenger;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{
    fixture, test_config, wait_until, CountingRemote, RecordingMessenger, RemoteBehavior,
    ScriptedExecutor,
};

fn service(
    dir: &tempfile::TempDir,
    executor: ScriptedExecutor,
) -> (Orchestrator, Arc<RecordingMessenger>, Arc<ScriptedExecutor>) {
    let config = Arc::new(test_config(dir.path().to_str().expect("utf8"), ""));
    let messenger = Arc::new(RecordingMessenger::new());
    let executor = Arc::new(executor);
    let parts = Collaborators {
        messenger: Arc::clone(&messenger) as Arc<dyn Messenger>,
        executor: Arc::clone(&executor) as Arc<dyn Executor>,
        remote: None,
        history: Some(Arc::new(MemoryHistoryStore::default()) as Arc<dyn HistoryStore>),
    };
    (Orchestrator::new(config, parts), messenger, executor)
}

/// Background loops stop promptly on shutdown.
#[tokio::test]
async fn started_service_shuts_down_promptly() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (mut service, _messenger, _executor) = service(&temp, ScriptedExecutor::succeeding("ok"));
    service.start();

    let token = service.cancellation();
    tokio::time::timeout(Duration::from_secs(2), service.shutdown())
        .await
        .expect("shutdown completes");
    assert!(token.is_cancelled());
}

/// Lines read from the intake stream are dispatched per conversation.
#[tokio::test]
async fn intake_dispatches_lines() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (mut service, messenger, _executor) = service(&temp, ScriptedExecutor::succeeding("ok"));
    service.start();

    let (mut writer, reader) = tokio::io::duplex(1024);
    service.start_intake(reader);
    tokio::io::AsyncWriteExt::write_all(&mut writer, b"hello\n@team:user-2 /help\n")
        .await
        .expect("write input");

    assert!(
        wait_until(Duration::from_secs(2), || {
            messenger.has_text("local", "Hello! I'm Pilot") && messenger.has_text("team", "/status")
        })
        .await,
        "both lines should be answered"
    );

    drop(writer);
    service.shutdown().await;
}

/// End of input stops the whole service.
#[tokio::test]
async fn end_of_input_cancels_service() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (mut service, messenger, _executor) = service(&temp, ScriptedExecutor::succeeding("ok"));
    service.start();

    service.start_intake(&b"hi\n"[..]);
    let token = service.cancellation();
    tokio::time::timeout(Duration::from_secs(2), token.cancelled())
        .await
        .expect("eof cancels the service");

    service.shutdown().await;
    assert_eq!(messenger.replies("local").len(), 1);
}

/// Shutdown stops running executions without reporting a result.
#[tokio::test]
async fn shutdown_stops_running_tasks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (mut service, messenger, executor) = service(
        &temp,
        ScriptedExecutor::succeeding("late").with_delay(Duration::from_secs(30)),
    );
    service.start();

    let dispatcher = Arc::clone(service.dispatcher());
    dispatcher
        .handle_inbound(super::test_helpers::inbound("chat-1", "/nopr add a changelog"))
        .await;
    assert!(wait_until(Duration::from_secs(1), || !executor.executed().is_empty()).await);

    tokio::time::timeout(Duration::from_secs(2), service.shutdown())
        .await
        .expect("shutdown completes");
    assert!(messenger.results("chat-1").is_empty());
    assert_eq!(dispatcher.state().tasks.counts(), (0, 0));
}

/// A quick `yes` waits for the slower proposal ahead of it in the same conversation.
#[tokio::test]
async fn intake_keeps_conversation_order() {
    let fx = fixture(ScriptedExecutor::succeeding("fixed"));
    let remote = Arc::new(CountingRemote::new(RemoteBehavior::Slow(
        Duration::from_millis(300),
        r#"{"intent": "task", "confidence": 0.9}"#.to_owned(),
    )));
    let dispatcher = Arc::new(fx.dispatcher(Some(remote as Arc<dyn RemoteClassifier>)));

    run_intake(
        &b"@c1 fix the login bug\n@c1 yes\n"[..],
        dispatcher,
        CancellationToken::new(),
    )
    .await;

    assert!(!fx.messenger.has_text("c1", "No pending task to confirm"));
    assert!(!fx.tasks.has_pending("c1"));
    assert!(wait_until(Duration::from_secs(2), || fx.executor.executed().len() == 1).await);

    let order: Vec<String> = fx
        .conversations
        .history("c1")
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(order, vec!["fix the login bug", "yes"]);
}

/// A slow conversation does not hold up another one.
#[tokio::test]
async fn intake_runs_conversations_independently() {
    let fx = fixture(ScriptedExecutor::succeeding("unused"));
    let remote = Arc::new(CountingRemote::new(RemoteBehavior::Slow(
        Duration::from_millis(1500),
        r#"{"intent": "chat", "confidence": 0.9}"#.to_owned(),
    )));
    let dispatcher = Arc::new(fx.dispatcher(Some(remote as Arc<dyn RemoteClassifier>)));

    let intake = tokio::spawn(run_intake(
        &b"@slow tell me something nice\n@fast /help\n"[..],
        dispatcher,
        CancellationToken::new(),
    ));

    assert!(
        wait_until(Duration::from_millis(700), || fx.messenger.has_text("fast", "/status")).await,
        "the fast conversation should be answered while the slow one classifies"
    );
    intake.await.expect("intake task");
}

//! Integration tests for the host CLI executor, using `sh -c` as the host.

#![cfg(unix)]

use std::time::Duration;

use pilot_orchestrator::driver::{CliExecutor, Executor};
use pilot_orchestrator::models::execution::ExecTask;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// `sh -c <script>`: the task description is the script.
fn shell() -> CliExecutor {
    CliExecutor::new("sh", vec!["-c".to_owned()])
}

fn task(dir: &tempfile::TempDir, script: &str) -> ExecTask {
    ExecTask {
        id: "TG-1".into(),
        title: "shell".into(),
        description: script.into(),
        project_path: dir.path().to_path_buf(),
        branch: "pilot/TG-1".into(),
        base_branch: "main".into(),
        create_pr: true,
        member_id: "alice".into(),
    }
}

/// Output lines become progress events and the full output is returned.
#[tokio::test]
async fn captures_output_and_progress() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tx, mut rx) = mpsc::channel(16);

    let result = shell()
        .execute(
            task(&temp, "echo first; echo second"),
            tx,
            CancellationToken::new(),
        )
        .await
        .expect("execution succeeds");

    assert!(result.success);
    assert_eq!(result.output, "first\nsecond");
    assert_eq!(result.artifact_url, None);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].message, "first");
    assert_eq!(events[0].percent, 5);
    assert_eq!(events[1].percent, 10);
    assert_eq!(events[2].phase, "Completed");
    assert_eq!(events[2].percent, 100);
}

/// Task metadata reaches the child through its environment and working directory.
#[tokio::test]
async fn exports_task_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tx, _rx) = mpsc::channel(16);

    let result = shell()
        .execute(
            task(
                &temp,
                "echo \"$PILOT_TASK_ID $PILOT_BRANCH $PILOT_BASE_BRANCH $PILOT_CREATE_PR $PILOT_MEMBER_ID\"; pwd",
            ),
            tx,
            CancellationToken::new(),
        )
        .await
        .expect("execution succeeds");

    let mut lines = result.output.lines();
    assert_eq!(lines.next(), Some("TG-1 pilot/TG-1 main 1 alice"));
    let cwd = std::path::PathBuf::from(lines.next().expect("pwd line"));
    assert_eq!(
        cwd.canonicalize().expect("canonical cwd"),
        temp.path().canonicalize().expect("canonical tempdir")
    );
}

/// A non-zero exit is an unsuccessful result carrying stderr.
#[tokio::test]
async fn failing_command_reports_stderr() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tx, _rx) = mpsc::channel(16);

    let result = shell()
        .execute(
            task(&temp, "echo partial; echo broken >&2; exit 3"),
            tx,
            CancellationToken::new(),
        )
        .await
        .expect("process ran");

    assert!(!result.success);
    assert!(result.output.contains("partial"));
    assert!(result.output.contains("broken"));
}

#[tokio::test]
async fn pull_request_url_is_extracted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tx, _rx) = mpsc::channel(16);

    let result = shell()
        .execute(
            task(&temp, "echo 'Opened https://github.com/acme/app/pull/42 for review'"),
            tx,
            CancellationToken::new(),
        )
        .await
        .expect("execution succeeds");

    assert_eq!(
        result.artifact_url.as_deref(),
        Some("https://github.com/acme/app/pull/42")
    );
}

/// Cancelling through the executor kills the child promptly.
#[tokio::test]
async fn cancel_kills_running_process() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = std::sync::Arc::new(shell());
    let (tx, _rx) = mpsc::channel(16);

    let run = {
        let executor = std::sync::Arc::clone(&executor);
        let task = task(&temp, "sleep 30");
        tokio::spawn(async move { executor.execute(task, tx, CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    executor.cancel("TG-1").await.expect("cancel request");

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("execution stops")
        .expect("join");
    let err = outcome.expect_err("cancelled run");
    assert!(err.to_string().contains("cancelled"));
}

/// Unknown task IDs are not an error.
#[tokio::test]
async fn cancel_unknown_task_is_ok() {
    assert!(shell().cancel("nope").await.is_ok());
}

#[tokio::test]
async fn missing_program_fails_to_spawn() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tx, _rx) = mpsc::channel(16);
    let executor = CliExecutor::new("/definitely/not/a/binary", Vec::new());

    let err = executor
        .execute(task(&temp, "ignored"), tx, CancellationToken::new())
        .await
        .expect_err("spawn fails");
    assert!(err.to_string().contains("failed to spawn host cli"));
}

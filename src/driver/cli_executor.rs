//! Host CLI executor.
//!
//! Spawns the configured host CLI (e.g. `claude --print <prompt>`) inside
//! the project directory. Each stdout line becomes a progress event; the
//! full output is returned when the process exits.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use futures_util::StreamExt;
use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::Executor;
use crate::config::GlobalConfig;
use crate::models::execution::{ExecResult, ExecTask, ProgressEvent};
use crate::models::truncate_chars;
use crate::{AppError, Result};

/// Percent reported while output is still streaming.
const STREAMING_PERCENT_CAP: u8 = 95;

/// Percent gained per output line.
const PERCENT_PER_LINE: u8 = 5;

/// Detail budget for a progress line.
const DETAIL_CHARS: usize = 120;

/// Runs tasks through a host CLI process.
pub struct CliExecutor {
    program: String,
    args: Vec<String>,
    active: Mutex<HashMap<String, CancellationToken>>,
    artifact_pattern: Option<Regex>,
}

impl CliExecutor {
    /// Build an executor for `program` invoked with `args` before the prompt.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            active: Mutex::new(HashMap::new()),
            artifact_pattern: Regex::new(r"https://github\.com/[\w.-]+/[\w.-]+/pull/\d+").ok(),
        }
    }

    /// Build an executor from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(config.host_cli.clone(), config.host_cli_args.clone())
    }

    /// First pull-request URL mentioned in `output`.
    #[must_use]
    pub fn extract_artifact_url(&self, output: &str) -> Option<String> {
        self.artifact_pattern
            .as_ref()
            .and_then(|re| re.find(output))
            .map(|m| m.as_str().to_owned())
    }

    fn register(&self, task_id: &str, cancel: &CancellationToken) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.to_owned(), cancel.clone());
    }

    fn unregister(&self, task_id: &str) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id);
    }

    async fn run(
        &self,
        task: ExecTask,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<ExecResult> {
        let started = Instant::now();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&task.description)
            .env("PILOT_TASK_ID", &task.id)
            .env("PILOT_BRANCH", &task.branch)
            .env("PILOT_BASE_BRANCH", &task.base_branch)
            .env("PILOT_CREATE_PR", if task.create_pr { "1" } else { "0" })
            .env("PILOT_MEMBER_ID", &task.member_id)
            .current_dir(&task.project_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Executor(format!("failed to spawn host cli: {err}")))?;
        info!(
            task_id = task.id,
            pid = child.id().unwrap_or(0),
            program = self.program,
            "execution process spawned"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Executor("host cli stdout unavailable".into()))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut lines = FramedRead::new(stdout, LinesCodec::new());
        let mut output = String::new();
        let mut percent: u8 = 0;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(task_id = task.id, "execution cancelled, killing process");
                    if let Err(err) = child.kill().await {
                        warn!(task_id = task.id, %err, "failed to kill host cli");
                    }
                    return Err(AppError::Executor("execution cancelled".into()));
                }

                item = lines.next() => {
                    match item {
                        None => break,
                        Some(Err(err)) => {
                            warn!(task_id = task.id, %err, "unreadable output line, skipping");
                        }
                        Some(Ok(line)) => {
                            output.push_str(&line);
                            output.push('\n');
                            if line.trim().is_empty() {
                                continue;
                            }
                            percent = percent.saturating_add(PERCENT_PER_LINE).min(STREAMING_PERCENT_CAP);
                            let event = ProgressEvent {
                                task_id: task.id.clone(),
                                phase: "Running".into(),
                                percent,
                                message: truncate_chars(line.trim(), DETAIL_CHARS),
                            };
                            // A closed receiver only means nobody is watching.
                            let _ = progress.send(event).await;
                        }
                    }
                }
            }
        }

        let status = tokio::select! {
            () = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(AppError::Executor("execution cancelled".into()));
            }
            status = child.wait() => status?,
        };

        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() && !stderr.trim().is_empty() {
            output.push_str(stderr.trim());
        }

        let _ = progress
            .send(ProgressEvent {
                task_id: task.id.clone(),
                phase: "Completed".into(),
                percent: 100,
                message: String::new(),
            })
            .await;

        Ok(ExecResult {
            artifact_url: self.extract_artifact_url(&output),
            output: output.trim_end().to_owned(),
            success: status.success(),
            duration: started.elapsed(),
        })
    }
}

impl Executor for CliExecutor {
    fn execute(
        &self,
        task: ExecTask,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<ExecResult>> + Send + '_>> {
        Box::pin(async move {
            let span = info_span!("cli_execute", task_id = %task.id);
            let task_id = task.id.clone();
            self.register(&task_id, &cancel);
            let result = self.run(task, progress, cancel).instrument(span).await;
            self.unregister(&task_id);
            result
        })
    }

    fn cancel(&self, task_id: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let token = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned();
        Box::pin(async move {
            if let Some(token) = token {
                token.cancel();
            }
            Ok(())
        })
    }
}

//! Per-conversation task lifecycle.
//!
//! Each conversation moves through `none → pending → running` with at most
//! one pending and one running task at any instant. The state maps sit
//! behind a single mutex that is never held across transport, executor or
//! store calls: every operation locks, mutates, releases, then performs I/O.
//!
//! Confirmed executions run as independent units tracked by a
//! [`TaskTracker`]; each gets a child [`CancellationToken`] and its own
//! progress channel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::backlog::Backlog;
use super::progress::ProgressThrottle;
use crate::admission::RateLimiter;
use crate::config::GlobalConfig;
use crate::driver::Executor;
use crate::errors::LimitKind;
use crate::identity::MemberResolver;
use crate::models::execution::{ExecResult, ExecTask, ExecutionRecord, ProgressEvent};
use crate::models::task::{ArtifactPolicy, PendingTask, RunningTask, TaskSnapshot};
use crate::models::truncate_chars;
use crate::policy::TaskPolicy;
use crate::store::HistoryStore;
use crate::transport::{MessageRef, Messenger, Reply};
use crate::{AppError, Result};

/// Buffered progress events per execution.
const PROGRESS_BUFFER: usize = 64;

/// Title budget for executor tasks.
const TITLE_CHARS: usize = 50;

/// Tunables for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Project directory handed to the executor.
    pub project_path: PathBuf,
    /// Prefix for generated task IDs.
    pub task_id_prefix: String,
    /// Whether [`ArtifactPolicy::Auto`] consults the ephemeral heuristic.
    pub detect_ephemeral: bool,
    /// Age after which a pending proposal expires.
    pub pending_ttl: Duration,
    /// Base branch for durable tasks.
    pub base_branch: String,
    /// Upper bound on a confirmed execution, if any.
    pub task_timeout: Option<Duration>,
}

impl ManagerSettings {
    /// Derive settings from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            project_path: config.project_path.clone(),
            task_id_prefix: config.task_id_prefix.clone(),
            detect_ephemeral: config.tasks.detect_ephemeral,
            pending_ttl: config.tasks.pending_ttl(),
            base_branch: config.tasks.base_branch.clone(),
            task_timeout: (config.timeouts.task_seconds > 0)
                .then(|| Duration::from_secs(config.timeouts.task_seconds)),
        }
    }
}

/// Result of a successful [`TaskLifecycleManager::confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The pending task started executing.
    Started {
        /// Running task.
        task_id: String,
    },
    /// The pending task was discarded.
    Rejected {
        /// Discarded task.
        task_id: String,
    },
}

/// Result of a successful [`TaskLifecycleManager::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A pending proposal was discarded.
    PendingCancelled {
        /// Discarded task.
        task_id: String,
    },
    /// A running execution was stopped.
    Stopped {
        /// Stopped task.
        task_id: String,
    },
}

#[derive(Debug, Default)]
struct TaskState {
    pending: HashMap<String, PendingTask>,
    running: HashMap<String, RunningTask>,
    last_id_secs: i64,
}

/// Everything an execution unit needs after the lock is released.
struct Launch {
    conversation_id: String,
    sender_id: String,
    task_id: String,
    description: String,
    policy: ArtifactPolicy,
    cancel: CancellationToken,
}

/// Owns pending and running task state for every conversation.
pub struct TaskLifecycleManager {
    state: Mutex<TaskState>,
    limiter: Arc<RateLimiter>,
    executor: Arc<dyn Executor>,
    messenger: Arc<dyn Messenger>,
    policy: Arc<dyn TaskPolicy>,
    backlog: Backlog,
    history: Option<Arc<dyn HistoryStore>>,
    members: Option<Arc<dyn MemberResolver>>,
    settings: ManagerSettings,
    cancel: CancellationToken,
    executions: TaskTracker,
}

impl TaskLifecycleManager {
    /// Construct a manager. Executions are children of `cancel`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        settings: ManagerSettings,
        limiter: Arc<RateLimiter>,
        executor: Arc<dyn Executor>,
        messenger: Arc<dyn Messenger>,
        policy: Arc<dyn TaskPolicy>,
        history: Option<Arc<dyn HistoryStore>>,
        members: Option<Arc<dyn MemberResolver>>,
        cancel: CancellationToken,
    ) -> Self {
        let backlog = Backlog::new(settings.project_path.join(".agent").join("tasks"));
        Self {
            state: Mutex::new(TaskState::default()),
            limiter,
            executor,
            messenger,
            policy,
            backlog,
            history,
            members,
            settings,
            cancel,
            executions: TaskTracker::new(),
        }
    }

    /// Backlog reader for the configured project.
    #[must_use]
    pub fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    /// Project directory tasks run in.
    #[must_use]
    pub fn project_path(&self) -> &std::path::Path {
        &self.settings.project_path
    }

    /// Propose a task for confirmation.
    ///
    /// A backlog reference in `description` is replaced by the referenced
    /// task's content.
    ///
    /// # Errors
    ///
    /// - [`AppError::Conflict`] if the conversation already has a pending or
    ///   running task.
    /// - [`AppError::RateLimited`] if the task budget is exhausted; no state
    ///   changes in that case.
    pub async fn propose_task(
        &self,
        conversation_id: &str,
        sender_id: &str,
        description: &str,
        policy: ArtifactPolicy,
    ) -> Result<PendingTask> {
        let description = match self.backlog.resolve(description).await {
            Some(task) => {
                debug!(conversation_id, backlog_id = task.id, "resolved backlog reference");
                task.description()
            }
            None => description.to_owned(),
        };
        self.propose(conversation_id, sender_id, description, policy)
            .await
    }

    /// Propose an implementation plan for confirmation, verbatim.
    ///
    /// # Errors
    ///
    /// Same as [`propose_task`](Self::propose_task).
    pub async fn propose_plan(
        &self,
        conversation_id: &str,
        sender_id: &str,
        plan: &str,
        request: &str,
    ) -> Result<PendingTask> {
        let description =
            format!("## Implementation Plan\n\n{plan}\n\n## Original Request\n\n{request}");
        self.propose(conversation_id, sender_id, description, ArtifactPolicy::Auto)
            .await
    }

    async fn propose(
        &self,
        conversation_id: &str,
        sender_id: &str,
        description: String,
        policy: ArtifactPolicy,
    ) -> Result<PendingTask> {
        let pending = {
            let mut state = self.lock();
            ensure_idle(&state, conversation_id)?;
            if !self.limiter.allow_task(conversation_id) {
                warn!(conversation_id, "task rate limit exceeded");
                return Err(AppError::RateLimited(LimitKind::Task));
            }
            let task_id = next_task_id(&mut state, &self.settings.task_id_prefix);
            let pending = PendingTask {
                task_id,
                description,
                conversation_id: conversation_id.to_owned(),
                sender_id: sender_id.to_owned(),
                confirmation_ref: None,
                policy,
                created_at: Utc::now(),
            };
            state
                .pending
                .insert(conversation_id.to_owned(), pending.clone());
            pending
        };
        info!(conversation_id, task_id = pending.task_id, "task proposed");

        let confirmation = Reply::Confirmation {
            task_id: pending.task_id.clone(),
            description: truncate_chars(
                &pending.description,
                self.messenger.max_message_length().saturating_sub(100),
            ),
            project: self.settings.project_path.display().to_string(),
        };
        let reference = match self.messenger.send(conversation_id, confirmation).await {
            Ok(reference) => reference,
            Err(err) => {
                warn!(conversation_id, %err, "failed to send task confirmation");
                self.notify(
                    conversation_id,
                    format!(
                        "📋 Task {}\n\n{}\n\nReply yes to execute or no to cancel.",
                        pending.task_id,
                        truncate_chars(&pending.description, 500)
                    ),
                )
                .await;
                None
            }
        };

        if let Some(reference) = reference {
            let mut state = self.lock();
            if let Some(stored) = state.pending.get_mut(conversation_id) {
                if stored.task_id == pending.task_id {
                    stored.confirmation_ref = Some(reference);
                }
            }
        }
        Ok(pending)
    }

    /// Accept or reject the conversation's pending task.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if nothing is pending.
    /// - [`AppError::Conflict`] when accepting while another task is still
    ///   running; the proposal stays pending.
    pub async fn confirm(
        self: &Arc<Self>,
        conversation_id: &str,
        accepted: bool,
    ) -> Result<ConfirmOutcome> {
        let decision = {
            let mut state = self.lock();
            if accepted {
                if let Some(running) = state.running.get(conversation_id) {
                    return Err(AppError::Conflict(format!(
                        "task {} is still running",
                        running.task_id
                    )));
                }
            }
            let Some(pending) = state.pending.remove(conversation_id) else {
                return Err(AppError::NotFound("no pending task to confirm".into()));
            };
            if accepted {
                Ok(self.start_locked(&mut state, pending))
            } else {
                Err(pending.task_id)
            }
        };

        match decision {
            Ok(launch) => {
                let task_id = self.spawn_execution(launch);
                Ok(ConfirmOutcome::Started { task_id })
            }
            Err(task_id) => {
                info!(conversation_id, task_id, "task rejected");
                self.notify(conversation_id, format!("❌ Task {task_id} cancelled."))
                    .await;
                Ok(ConfirmOutcome::Rejected { task_id })
            }
        }
    }

    /// Run a task immediately, skipping confirmation.
    ///
    /// # Errors
    ///
    /// - [`AppError::Conflict`] if a task is already running here.
    /// - [`AppError::RateLimited`] if the task budget is exhausted.
    pub fn run_direct(
        self: &Arc<Self>,
        conversation_id: &str,
        sender_id: &str,
        description: &str,
        policy: ArtifactPolicy,
    ) -> Result<String> {
        let launch = {
            let mut state = self.lock();
            if let Some(running) = state.running.get(conversation_id) {
                return Err(AppError::Conflict(format!(
                    "task {} is already running",
                    running.task_id
                )));
            }
            if !self.limiter.allow_task(conversation_id) {
                warn!(conversation_id, "task rate limit exceeded");
                return Err(AppError::RateLimited(LimitKind::Task));
            }
            let task_id = next_task_id(&mut state, &self.settings.task_id_prefix);
            let pending = PendingTask {
                task_id,
                description: description.to_owned(),
                conversation_id: conversation_id.to_owned(),
                sender_id: sender_id.to_owned(),
                confirmation_ref: None,
                policy,
                created_at: Utc::now(),
            };
            self.start_locked(&mut state, pending)
        };
        Ok(self.spawn_execution(launch))
    }

    /// Resolve a backlog reference and run it immediately.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if the reference does not name a backlog task.
    /// - Otherwise as [`run_direct`](Self::run_direct).
    pub async fn run_backlog(
        self: &Arc<Self>,
        conversation_id: &str,
        sender_id: &str,
        reference: &str,
    ) -> Result<String> {
        let task = self
            .backlog
            .resolve(reference)
            .await
            .ok_or_else(|| AppError::NotFound(format!("backlog task {reference}")))?;
        self.run_direct(
            conversation_id,
            sender_id,
            &task.description(),
            ArtifactPolicy::Auto,
        )
    }

    /// Cancel the conversation's pending task, or stop its running one.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the conversation has neither.
    pub async fn cancel(&self, conversation_id: &str) -> Result<CancelOutcome> {
        let (pending, running) = {
            let mut state = self.lock();
            if let Some(pending) = state.pending.remove(conversation_id) {
                (Some(pending), None)
            } else if let Some(running) = state.running.get(conversation_id) {
                running.cancel.cancel();
                (None, state.running.remove(conversation_id))
            } else {
                (None, None)
            }
        };

        if let Some(pending) = pending {
            info!(conversation_id, task_id = pending.task_id, "pending task cancelled");
            self.notify(
                conversation_id,
                format!("❌ Cancelled pending task {}", pending.task_id),
            )
            .await;
            return Ok(CancelOutcome::PendingCancelled {
                task_id: pending.task_id,
            });
        }

        if let Some(running) = running {
            info!(conversation_id, task_id = running.task_id, "stopping running task");
            if let Err(err) = self.executor.cancel(&running.task_id).await {
                warn!(task_id = running.task_id, %err, "executor cancel request failed");
            }
            self.notify(
                conversation_id,
                format!("🛑 Stopping task {}", running.task_id),
            )
            .await;
            return Ok(CancelOutcome::Stopped {
                task_id: running.task_id,
            });
        }

        Err(AppError::NotFound("no task to cancel".into()))
    }

    /// Drop pending tasks older than the configured TTL and tell their
    /// conversations. Returns the affected conversation IDs.
    pub async fn expire_pending(&self) -> Vec<String> {
        let ttl = chrono::Duration::from_std(self.settings.pending_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - ttl;
        let expired: Vec<String> = {
            let mut state = self.lock();
            let ids: Vec<String> = state
                .pending
                .iter()
                .filter(|(_, task)| task.created_at < cutoff)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                state.pending.remove(id);
            }
            ids
        };

        let minutes = self.settings.pending_ttl.as_secs() / 60;
        for conversation_id in &expired {
            info!(conversation_id, "pending task expired");
            self.notify(
                conversation_id,
                format!("⏰ Pending task expired ({minutes} min timeout). Send a new request."),
            )
            .await;
        }
        expired
    }

    /// Current pending/running state of a conversation.
    #[must_use]
    pub fn snapshot(&self, conversation_id: &str) -> TaskSnapshot {
        let state = self.lock();
        TaskSnapshot {
            pending: state.pending.get(conversation_id).cloned(),
            running: state.running.get(conversation_id).cloned(),
        }
    }

    /// Whether the conversation has a proposal awaiting confirmation.
    #[must_use]
    pub fn has_pending(&self, conversation_id: &str) -> bool {
        self.lock().pending.contains_key(conversation_id)
    }

    /// Number of pending and running tasks across all conversations.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.pending.len(), state.running.len())
    }

    /// Cancel every execution and wait for them to wind down.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.executions.close();
        self.executions.wait().await;
        info!("task executions drained");
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_locked(&self, state: &mut TaskState, pending: PendingTask) -> Launch {
        let cancel = self.cancel.child_token();
        state.running.insert(
            pending.conversation_id.clone(),
            RunningTask {
                task_id: pending.task_id.clone(),
                title: truncate_chars(&pending.description, TITLE_CHARS),
                conversation_id: pending.conversation_id.clone(),
                started_at: Utc::now(),
                cancel: cancel.clone(),
            },
        );
        Launch {
            conversation_id: pending.conversation_id,
            sender_id: pending.sender_id,
            task_id: pending.task_id,
            description: pending.description,
            policy: pending.policy,
            cancel,
        }
    }

    fn spawn_execution(self: &Arc<Self>, launch: Launch) -> String {
        let task_id = launch.task_id.clone();
        let span = info_span!(
            "task_execution",
            conversation_id = %launch.conversation_id,
            task_id = %launch.task_id
        );
        let manager = Arc::clone(self);
        self.executions
            .spawn(async move { manager.execute(launch).await }.instrument(span));
        task_id
    }

    fn wants_artifact(&self, policy: ArtifactPolicy, description: &str) -> bool {
        match policy {
            ArtifactPolicy::Durable => true,
            ArtifactPolicy::Ephemeral => false,
            ArtifactPolicy::Auto => {
                !(self.settings.detect_ephemeral && self.policy.is_ephemeral(description))
            }
        }
    }

    fn resolve_member(&self, sender_id: &str) -> String {
        let Some(members) = &self.members else {
            return String::new();
        };
        if sender_id.is_empty() {
            return String::new();
        }
        match members.resolve_identity(sender_id) {
            Ok(member_id) => member_id,
            Err(err) => {
                warn!(sender_id, %err, "failed to resolve identity");
                String::new()
            }
        }
    }

    async fn execute(self: Arc<Self>, launch: Launch) {
        let create_pr = self.wants_artifact(launch.policy, &launch.description);
        if !create_pr {
            debug!(task_id = launch.task_id, "ephemeral task, skipping pr creation");
        }
        let pr_note = if create_pr { "" } else { " (no PR)" };

        let start = Reply::Progress {
            edit: None,
            task_id: launch.task_id.clone(),
            phase: format!("Starting{pr_note}"),
            percent: 0,
            detail: "Initializing...".into(),
        };
        let progress_ref = match self.messenger.send(&launch.conversation_id, start).await {
            Ok(reference) => reference,
            Err(err) => {
                warn!(%err, "failed to send progress start");
                self.notify(
                    &launch.conversation_id,
                    format!("🚀 Starting {}{pr_note}...", launch.task_id),
                )
                .await;
                None
            }
        };

        let (branch, base_branch) = if create_pr {
            (
                format!("pilot/{}", launch.task_id),
                self.settings.base_branch.clone(),
            )
        } else {
            (String::new(), String::new())
        };
        let task = ExecTask {
            id: launch.task_id.clone(),
            title: truncate_chars(&launch.description, TITLE_CHARS),
            description: launch.description,
            project_path: self.settings.project_path.clone(),
            branch,
            base_branch,
            create_pr,
            member_id: self.resolve_member(&launch.sender_id),
        };
        let title = task.title.clone();

        info!("executing task");
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_BUFFER);
        let run = self
            .executor
            .execute(task, progress_tx, launch.cancel.clone());
        let run = async {
            let Some(limit) = self.settings.task_timeout else {
                return (run.await, false);
            };
            match tokio::time::timeout(limit, run).await {
                Ok(outcome) => (outcome, false),
                Err(_) => {
                    launch.cancel.cancel();
                    let err = AppError::Executor(format!("timed out after {}s", limit.as_secs()));
                    (Err(err), true)
                }
            }
        };
        let forward = self.forward_progress(
            &launch.conversation_id,
            progress_ref,
            progress_rx,
            &launch.cancel,
        );
        let ((outcome, timed_out), ()) = tokio::join!(run, forward);

        // A timeout cancels the token too, but still reports a failure.
        let stopped = launch.cancel.is_cancelled() && !timed_out;
        self.finish(&launch.conversation_id, &launch.task_id);

        let result = match outcome {
            Ok(result) => result,
            Err(_) if stopped => {
                info!("task stopped before completion");
                return;
            }
            Err(err) => {
                error!(%err, "task failed");
                ExecResult {
                    output: err.to_string(),
                    ..ExecResult::default()
                }
            }
        };

        if stopped {
            info!(success = result.success, "task finished after stop, result not reported");
        } else {
            info!(success = result.success, "task finished");
            let reply = Reply::Result {
                task_id: launch.task_id.clone(),
                success: result.success,
                output: result.output.clone(),
                artifact_url: result.artifact_url.clone(),
            };
            if let Err(err) = self.messenger.send(&launch.conversation_id, reply).await {
                warn!(%err, "failed to send task result");
            }
        }

        if let Some(history) = &self.history {
            let record = ExecutionRecord {
                id: uuid::Uuid::new_v4().to_string(),
                task_id: launch.task_id.clone(),
                conversation_id: launch.conversation_id.clone(),
                title,
                success: result.success,
                artifact_url: result.artifact_url,
                duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
                finished_at: Utc::now(),
            };
            if let Err(err) = history.record_execution(record).await {
                warn!(%err, "failed to record execution");
            }
        }
    }

    async fn forward_progress(
        &self,
        conversation_id: &str,
        mut reference: Option<MessageRef>,
        mut events: mpsc::Receiver<ProgressEvent>,
        cancel: &CancellationToken,
    ) {
        let mut throttle = ProgressThrottle::new();
        while let Some(event) = events.recv().await {
            if cancel.is_cancelled() {
                continue;
            }
            if !throttle.should_forward(&event.phase, event.percent, Instant::now()) {
                continue;
            }
            let update = Reply::Progress {
                edit: reference.clone(),
                task_id: event.task_id,
                phase: event.phase,
                percent: event.percent,
                detail: event.message,
            };
            match self.messenger.send(conversation_id, update).await {
                Ok(Some(next)) => reference = Some(next),
                Ok(None) => {}
                Err(err) => debug!(%err, "failed to forward progress"),
            }
        }
    }

    /// Remove the running entry for `task_id`, cancelling its token first.
    fn finish(&self, conversation_id: &str, task_id: &str) {
        let mut state = self.lock();
        let owned = state
            .running
            .get(conversation_id)
            .is_some_and(|running| running.task_id == task_id);
        if owned {
            if let Some(running) = state.running.get(conversation_id) {
                running.cancel.cancel();
            }
            state.running.remove(conversation_id);
        }
    }

    async fn notify(&self, conversation_id: &str, text: String) {
        if let Err(err) = self.messenger.send(conversation_id, Reply::Text(text)).await {
            warn!(conversation_id, %err, "failed to send notice");
        }
    }
}

fn ensure_idle(state: &TaskState, conversation_id: &str) -> Result<()> {
    if let Some(pending) = state.pending.get(conversation_id) {
        return Err(AppError::Conflict(format!(
            "task {} is awaiting confirmation",
            pending.task_id
        )));
    }
    if let Some(running) = state.running.get(conversation_id) {
        return Err(AppError::Conflict(format!(
            "task {} is still running",
            running.task_id
        )));
    }
    Ok(())
}

/// `<prefix>-<unix seconds>`, bumped past the last issued value so IDs stay unique.
fn next_task_id(state: &mut TaskState, prefix: &str) -> String {
    let secs = Utc::now().timestamp().max(state.last_id_secs + 1);
    state.last_id_secs = secs;
    format!("{prefix}-{secs}")
}

/// Spawn the periodic pending-task expiry sweep.
#[must_use]
pub fn spawn_expiry_task(
    manager: Arc<TaskLifecycleManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("task expiry sweep shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = manager.expire_pending().await;
                    if !expired.is_empty() {
                        debug!(count = expired.len(), "expired pending tasks");
                    }
                }
            }
        }
    })
}

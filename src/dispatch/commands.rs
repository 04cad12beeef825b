//! Slash command router.

use std::fmt::Write as _;

use chrono::Utc;
use tracing::{info, warn};

use super::Dispatcher;
use crate::models::task::ArtifactPolicy;
use crate::models::truncate_chars;
use crate::AppError;

const HELP_TEXT: &str = "🤖 Pilot Bot

I execute tasks and answer questions about your codebase.

Commands
/status — Current task status
/cancel — Cancel pending/running task
/history — Recent task history
/clear — Forget this conversation
/help — This message

Task Commands
/tasks — Show task backlog
/run <id> — Execute task (e.g., /run 07)
/stop — Stop running task
/nopr <task> — Execute without creating PR
/pr <task> — Force PR creation

Quick Patterns
• task 07 or #07 — Propose TASK-07 from the backlog

What I Understand
• Tasks: \"Create a file...\", \"Add feature...\"
• Questions: \"What handles auth?\", \"How does X work?\"
• Greetings: \"Hi\", \"Hello\"

Note: Ephemeral commands (serve, run, etc.) auto-skip PR creation.";

const RUN_USAGE: &str = "Usage: /run <task-id>\nExample: /run 07";

/// Recent executions listed by `/history`.
const HISTORY_LIMIT: usize = 10;

/// Split `/name@bot args` into a lowercase command name and its argument text.
#[must_use]
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (head, args) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, args.trim().to_owned()))
}

impl Dispatcher {
    /// Route a slash command.
    pub(crate) async fn handle_command(&self, conversation_id: &str, sender_id: &str, text: &str) {
        let Some((name, args)) = parse_command(text) else {
            self.reply(conversation_id, "Unknown command. Use /help for available commands.")
                .await;
            return;
        };
        info!(conversation_id, command = name, "handling command");

        match name.as_str() {
            "start" | "help" => self.reply(conversation_id, HELP_TEXT).await,
            "status" => self.handle_status(conversation_id).await,
            "cancel" => {
                if self.state.tasks.cancel(conversation_id).await.is_err() {
                    self.reply(conversation_id, "No task to cancel.").await;
                }
            }
            "stop" => self.handle_stop(conversation_id).await,
            "tasks" | "list" => self.handle_backlog(conversation_id).await,
            "run" => self.handle_run(conversation_id, sender_id, &args).await,
            "nopr" => {
                self.handle_forced(conversation_id, sender_id, &args, ArtifactPolicy::Ephemeral)
                    .await;
            }
            "pr" => {
                self.handle_forced(conversation_id, sender_id, &args, ArtifactPolicy::Durable)
                    .await;
            }
            "history" => self.handle_history(conversation_id).await,
            "clear" => {
                self.state.conversations.clear(conversation_id);
                self.reply(conversation_id, "🧹 Conversation history cleared.")
                    .await;
            }
            _ => {
                self.reply(conversation_id, "Unknown command. Use /help for available commands.")
                    .await;
            }
        }
    }

    async fn handle_status(&self, conversation_id: &str) {
        let snapshot = self.state.tasks.snapshot(conversation_id);
        let now = Utc::now();
        let mut text = String::from("📊 Status\n\n");
        let _ = writeln!(
            text,
            "📁 Project: {}",
            self.state.tasks.project_path().display()
        );

        if let Some(running) = &snapshot.running {
            let elapsed = (now - running.started_at).num_seconds().max(0);
            let _ = write!(
                text,
                "\n🔄 Running: {}\n   ⏱ {elapsed}s\n",
                running.task_id
            );
        }
        if let Some(pending) = &snapshot.pending {
            let age = (now - pending.created_at).num_seconds().max(0);
            let _ = write!(
                text,
                "\n⏳ Pending: {}\n   Awaiting confirmation ({age}s)\n",
                pending.task_id
            );
        }
        if snapshot.running.is_none() && snapshot.pending.is_none() {
            text.push_str("\n✅ Ready for tasks\n");
        }

        let limiter = &self.state.limiter;
        if let (Some(messages), Some(tasks)) = (
            limiter.remaining_messages(conversation_id),
            limiter.remaining_tasks(conversation_id),
        ) {
            let _ = write!(
                text,
                "\n🎟 Remaining: {messages} message(s), {tasks} task(s)"
            );
        }

        self.reply(conversation_id, text.trim_end()).await;
    }

    async fn handle_stop(&self, conversation_id: &str) {
        if self.state.tasks.snapshot(conversation_id).running.is_none() {
            self.reply(conversation_id, "No task is currently running.")
                .await;
            return;
        }
        if let Err(err) = self.state.tasks.cancel(conversation_id).await {
            info!(conversation_id, %err, "nothing left to stop");
            self.reply(conversation_id, "No task is currently running.")
                .await;
        }
    }

    async fn handle_backlog(&self, conversation_id: &str) {
        let tasks = match self.state.tasks.backlog().list().await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(conversation_id, %err, "failed to read backlog");
                self.reply(conversation_id, "❌ Failed to read the task backlog")
                    .await;
                return;
            }
        };
        if tasks.is_empty() {
            self.reply(conversation_id, "📋 No tasks found in .agent/tasks/")
                .await;
            return;
        }

        let mut text = String::from("📋 Task Backlog\n\n");
        for task in &tasks {
            let status = task.status.as_deref().unwrap_or_default().to_lowercase();
            let marker = match status.as_str() {
                "done" | "complete" | "completed" => "✅",
                "in progress" | "in-progress" | "active" => "🔄",
                _ => "⏳",
            };
            let _ = writeln!(text, "{marker} {}: {}", task.id, task.title);
        }
        self.reply_chunked(conversation_id, text.trim_end()).await;
    }

    async fn handle_run(&self, conversation_id: &str, sender_id: &str, reference: &str) {
        if reference.is_empty() {
            self.reply(conversation_id, RUN_USAGE).await;
            return;
        }
        match self
            .state
            .tasks
            .run_backlog(conversation_id, sender_id, reference)
            .await
        {
            Ok(task_id) => info!(conversation_id, task_id, "backlog task started"),
            Err(AppError::NotFound(_)) => {
                self.reply(
                    conversation_id,
                    format!("❌ Task {reference} not found in .agent/tasks/"),
                )
                .await;
            }
            Err(err) => self.report_task_error(conversation_id, &err).await,
        }
    }

    async fn handle_forced(
        &self,
        conversation_id: &str,
        sender_id: &str,
        description: &str,
        policy: ArtifactPolicy,
    ) {
        let (usage, label) = match policy {
            ArtifactPolicy::Ephemeral => (
                "Usage: /nopr <task description>\nExecutes task without creating a PR.",
                "without PR",
            ),
            _ => (
                "Usage: /pr <task description>\nForces PR creation even for ephemeral-looking tasks.",
                "with PR",
            ),
        };
        if description.is_empty() {
            self.reply(conversation_id, usage).await;
            return;
        }

        match self
            .state
            .tasks
            .run_direct(conversation_id, sender_id, description, policy)
        {
            Ok(task_id) => {
                info!(conversation_id, task_id, ?policy, "forced-policy task started");
                self.reply(
                    conversation_id,
                    format!("🚀 Executing {label}: {}", truncate_chars(description, 50)),
                )
                .await;
            }
            Err(err) => self.report_task_error(conversation_id, &err).await,
        }
    }

    async fn handle_history(&self, conversation_id: &str) {
        let Some(history) = &self.state.history else {
            self.reply(conversation_id, "📜 History is unavailable (no store configured)")
                .await;
            return;
        };
        let records = match history.recent_executions(HISTORY_LIMIT).await {
            Ok(records) => records,
            Err(err) => {
                warn!(conversation_id, %err, "failed to fetch history");
                self.reply(conversation_id, "❌ Failed to fetch history").await;
                return;
            }
        };
        if records.is_empty() {
            self.reply(conversation_id, "📜 No task history yet").await;
            return;
        }

        let mut text = String::from("📜 Recent Tasks\n\n");
        for record in &records {
            let emoji = if record.success { "✅" } else { "❌" };
            let _ = writeln!(text, "{emoji} {}", record.task_id);
            let _ = writeln!(
                text,
                "   {} • {}s",
                record.finished_at.format("%Y-%m-%d %H:%M"),
                record.duration_ms / 1000
            );
            if let Some(url) = &record.artifact_url {
                let _ = writeln!(text, "   PR: {url}");
            }
            text.push('\n');
        }
        self.reply_chunked(conversation_id, text.trim_end()).await;
    }
}

//! Inbound message dispatch.
//!
//! Every inbound message passes the same gate sequence: allowlist, message
//! rate limit, literal confirmation tokens, then classification. The
//! classified intent selects a handler: slash commands, a canned greeting,
//! read-only analysis runs, or a task proposal.

pub mod analysis;
pub mod commands;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::admission::RateLimiter;
use crate::classifier::IntentClassifier;
use crate::config::GlobalConfig;
use crate::conversation::ConversationStore;
use crate::driver::Executor;
use crate::errors::LimitKind;
use crate::models::intent::Intent;
use crate::models::task::ArtifactPolicy;
use crate::orchestrator::{ConfirmOutcome, TaskLifecycleManager};
use crate::store::HistoryStore;
use crate::transport::{chunk_text, InboundMessage, Messenger, Reply};
use crate::AppError;

const GREETING: &str = "👋 Hello! I'm Pilot. Send me a task, question, or say /help.";

const ACCEPT_TOKENS: &[&str] = &["yes", "y", "execute", "confirm", "ok"];
const REJECT_TOKENS: &[&str] = &["no", "n", "cancel", "abort", "nope"];

/// Shared components the dispatcher routes between.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Admission control.
    pub limiter: Arc<RateLimiter>,
    /// Conversation history used as classifier context.
    pub conversations: Arc<ConversationStore>,
    /// Intent classification chain.
    pub classifier: Arc<IntentClassifier>,
    /// Task state machine.
    pub tasks: Arc<TaskLifecycleManager>,
    /// Execution collaborator for read-only analysis runs.
    pub executor: Arc<dyn Executor>,
    /// Outbound transport.
    pub messenger: Arc<dyn Messenger>,
    /// Execution history, when a store is configured.
    pub history: Option<Arc<dyn HistoryStore>>,
}

/// A literal yes/no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationToken {
    /// Execute the pending task.
    Accept,
    /// Discard the pending task.
    Reject,
}

impl ConfirmationToken {
    /// Recognise a bare confirmation or rejection word.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let normalized = text.trim().to_lowercase();
        if ACCEPT_TOKENS.contains(&normalized.as_str()) {
            Some(Self::Accept)
        } else if REJECT_TOKENS.contains(&normalized.as_str()) {
            Some(Self::Reject)
        } else {
            None
        }
    }
}

/// Top-level inbound message router.
pub struct Dispatcher {
    state: Arc<AppState>,
    cancel: tokio_util::sync::CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher. Analysis runs are children of `cancel`.
    #[must_use]
    pub fn new(state: Arc<AppState>, cancel: tokio_util::sync::CancellationToken) -> Self {
        Self { state, cancel }
    }

    /// Access the shared application state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Process one inbound message end to end.
    ///
    /// Never fails: every failure mode becomes a user-visible notice or a log line.
    pub async fn handle_inbound(&self, message: InboundMessage) {
        let InboundMessage {
            conversation_id,
            sender_id,
            text,
        } = message;

        if !self.state.config.is_authorized(&conversation_id, &sender_id) {
            warn!(
                conversation_id,
                sender_id, "unauthorized message (silently ignored)"
            );
            return;
        }

        if !self.state.limiter.allow_message(&conversation_id) {
            warn!(conversation_id, "message rate limit exceeded");
            self.reply(
                &conversation_id,
                "⚠️ Rate limit exceeded. Please wait before sending more messages.",
            )
            .await;
            return;
        }

        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if let Some(token) = ConfirmationToken::parse(text) {
            self.state
                .conversations
                .add_user_message(&conversation_id, text, None);
            self.handle_confirmation(&conversation_id, token).await;
            return;
        }

        let history = self.state.conversations.history(&conversation_id);
        let classification = self.state.classifier.classify(text, &history).await;
        let intent = classification.intent;
        debug!(
            conversation_id,
            %intent,
            source = ?classification.source,
            confidence = classification.confidence,
            "classified message"
        );
        self.state
            .conversations
            .add_user_message(&conversation_id, text, Some(intent));

        match intent {
            Intent::Command => {
                self.handle_command(&conversation_id, &sender_id, text)
                    .await;
            }
            Intent::Greeting => self.reply(&conversation_id, GREETING).await,
            Intent::Question | Intent::Research | Intent::Planning | Intent::Chat => {
                self.run_analysis(&conversation_id, &sender_id, intent, text)
                    .await;
            }
            Intent::Task => {
                let description = if classification.task_summary.trim().is_empty() {
                    text.to_owned()
                } else {
                    classification.task_summary
                };
                self.propose(&conversation_id, &sender_id, &description, ArtifactPolicy::Auto)
                    .await;
            }
        }
    }

    async fn handle_confirmation(&self, conversation_id: &str, token: ConfirmationToken) {
        let accepted = token == ConfirmationToken::Accept;
        match self.state.tasks.confirm(conversation_id, accepted).await {
            Ok(ConfirmOutcome::Started { task_id }) => {
                info!(conversation_id, task_id, "task confirmed");
            }
            Ok(ConfirmOutcome::Rejected { .. }) => {}
            Err(AppError::NotFound(_)) => {
                let notice = if accepted
                    && self.state.conversations.last_user_intent(conversation_id)
                        == Some(Intent::Task)
                {
                    "⏰ That task is no longer pending. Send the request again."
                } else {
                    "No pending task to confirm."
                };
                self.reply(conversation_id, notice).await;
            }
            Err(err) => self.report_task_error(conversation_id, &err).await,
        }
    }

    pub(crate) async fn propose(
        &self,
        conversation_id: &str,
        sender_id: &str,
        description: &str,
        policy: ArtifactPolicy,
    ) {
        if let Err(err) = self
            .state
            .tasks
            .propose_task(conversation_id, sender_id, description, policy)
            .await
        {
            self.report_task_error(conversation_id, &err).await;
        }
    }

    /// Translate a lifecycle error into a user-visible notice.
    pub(crate) async fn report_task_error(&self, conversation_id: &str, err: &AppError) {
        let notice = match err {
            AppError::RateLimited(LimitKind::Task) => {
                "⚠️ Task rate limit exceeded. You've submitted too many tasks recently. \
                 Please wait before submitting more."
                    .to_owned()
            }
            AppError::RateLimited(LimitKind::Message) => {
                "⚠️ Rate limit exceeded. Please wait before sending more messages.".to_owned()
            }
            AppError::Conflict(_) => {
                let snapshot = self.state.tasks.snapshot(conversation_id);
                if let Some(pending) = snapshot.pending {
                    format!(
                        "⚠️ You already have a pending task: {}\n\n\
                         Reply yes to execute or no to cancel.",
                        pending.task_id
                    )
                } else if let Some(running) = snapshot.running {
                    format!(
                        "⚠️ Task {} is still running. Wait for it to finish or /stop it.",
                        running.task_id
                    )
                } else {
                    "⚠️ Another task just finished. Send the request again.".to_owned()
                }
            }
            AppError::NotFound(what) => format!("❌ Not found: {what}"),
            other => {
                warn!(conversation_id, %other, "task operation failed");
                format!("❌ {other}")
            }
        };
        self.reply(conversation_id, notice).await;
    }

    pub(crate) async fn reply(&self, conversation_id: &str, text: impl Into<String>) {
        if let Err(err) = self
            .state
            .messenger
            .send(conversation_id, Reply::text(text))
            .await
        {
            warn!(conversation_id, %err, "failed to send reply");
        }
    }

    /// Send long text as several messages within the transport's limit.
    pub(crate) async fn reply_chunked(&self, conversation_id: &str, text: &str) {
        let limit = self.state.messenger.max_message_length();
        for chunk in chunk_text(text, limit) {
            self.reply(conversation_id, chunk).await;
        }
    }
}

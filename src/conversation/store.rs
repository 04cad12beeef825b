//! In-memory conversation history with size and age bounds.
//!
//! Each conversation keeps at most `max_size` messages (oldest dropped
//! first). A background sweep removes conversations whose newest message
//! is older than the configured TTL.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::intent::Intent;
use crate::models::message::{ConversationMessage, Role};

/// Character budget for each line of a context summary.
pub const SUMMARY_CONTENT_CHARS: usize = 200;

/// How often the background sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Thread-safe conversation history store.
#[derive(Debug)]
pub struct ConversationStore {
    history: RwLock<HashMap<String, VecDeque<ConversationMessage>>>,
    max_size: usize,
    ttl: Duration,
}

impl ConversationStore {
    /// Create a store keeping `max_size` messages per conversation for `ttl`.
    #[must_use]
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
            max_size: max_size.max(1),
            ttl,
        }
    }

    /// Record a user message with its resolved intent.
    pub fn add_user_message(&self, conversation_id: &str, content: &str, intent: Option<Intent>) {
        self.push(conversation_id, ConversationMessage::user(content, intent));
    }

    /// Record a bot reply.
    pub fn add_assistant_message(&self, conversation_id: &str, content: &str) {
        self.push(conversation_id, ConversationMessage::assistant(content));
    }

    fn push(&self, conversation_id: &str, message: ConversationMessage) {
        let mut guard = self.write();
        let entries = guard.entry(conversation_id.to_owned()).or_default();
        entries.push_back(message);
        while entries.len() > self.max_size {
            entries.pop_front();
        }
    }

    /// Copy of the conversation's history, oldest first.
    #[must_use]
    pub fn history(&self, conversation_id: &str) -> Vec<ConversationMessage> {
        self.read()
            .get(conversation_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Render the last `limit` messages as `Role: content` lines.
    ///
    /// Content is flattened to one line and truncated to
    /// [`SUMMARY_CONTENT_CHARS`] characters.
    #[must_use]
    pub fn context_summary(&self, conversation_id: &str, limit: usize) -> String {
        let guard = self.read();
        let Some(entries) = guard.get(conversation_id) else {
            return String::new();
        };
        let skip = entries.len().saturating_sub(limit);
        let mut out = String::new();
        for message in entries.iter().skip(skip) {
            let flat = message.content.replace(['\r', '\n'], " ");
            let content = crate::models::truncate_chars(&flat, SUMMARY_CONTENT_CHARS);
            let _ = writeln!(out, "{}: {content}", message.role.label());
        }
        out
    }

    /// Most recent intent recorded on a user message.
    #[must_use]
    pub fn last_user_intent(&self, conversation_id: &str) -> Option<Intent> {
        self.read().get(conversation_id).and_then(|entries| {
            entries
                .iter()
                .rev()
                .filter(|m| m.role == Role::User)
                .find_map(|m| m.intent)
        })
    }

    /// Content of the most recent assistant message.
    #[must_use]
    pub fn last_assistant_message(&self, conversation_id: &str) -> Option<String> {
        self.read().get(conversation_id).and_then(|entries| {
            entries
                .iter()
                .rev()
                .find(|m| m.role == Role::Assistant)
                .map(|m| m.content.clone())
        })
    }

    /// Forget one conversation.
    pub fn clear(&self, conversation_id: &str) {
        self.write().remove(conversation_id);
    }

    /// Forget every conversation.
    pub fn clear_all(&self) {
        self.write().clear();
    }

    /// Number of tracked conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no conversation is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove conversations that are empty or whose newest message is past the TTL.
    ///
    /// Returns the number of conversations removed.
    pub fn sweep_expired(&self) -> usize {
        let ttl =
            chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(3650));
        let cutoff = Utc::now() - ttl;
        let mut guard = self.write();
        let before = guard.len();
        guard.retain(|_, entries| entries.back().is_some_and(|m| m.timestamp >= cutoff));
        before - guard.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, VecDeque<ConversationMessage>>> {
        self.history.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, VecDeque<ConversationMessage>>> {
        self.history.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawn the periodic history sweep.
#[must_use]
pub fn spawn_sweep_task(
    store: Arc<ConversationStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("conversation sweep shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = store.sweep_expired();
                    if removed > 0 {
                        debug!(removed, "expired conversation histories");
                    }
                }
            }
        }
    })
}

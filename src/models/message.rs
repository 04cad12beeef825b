//! Conversation history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::intent::Intent;

/// Author of a conversation entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human operator.
    User,
    /// The bot.
    Assistant,
}

impl Role {
    /// Label used when rendering history as text.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// A single message retained in a conversation's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    /// Who wrote the message.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Resolved intent; only set on user messages.
    pub intent: Option<Intent>,
    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    /// Build a user entry stamped with the current time.
    #[must_use]
    pub fn user(content: impl Into<String>, intent: Option<Intent>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            intent,
            timestamp: Utc::now(),
        }
    }

    /// Build an assistant entry stamped with the current time.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            intent: None,
            timestamp: Utc::now(),
        }
    }
}

//! Messaging transport seam.
//!
//! The orchestration core only talks to a [`Messenger`]; the wire protocol
//! behind it is an adapter concern.

pub mod console;

use std::future::Future;
use std::pin::Pin;

use crate::Result;

/// Opaque transport reference to a posted message, used for in-place edits.
pub type MessageRef = String;

/// An inbound operator message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Conversation (chat, channel, thread) the message arrived in.
    pub conversation_id: String,
    /// Transport identity of the author.
    pub sender_id: String,
    /// Raw message text.
    pub text: String,
}

/// Outbound message kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain text notice.
    Text(String),
    /// Proposal awaiting yes/no.
    Confirmation {
        /// Proposed task.
        task_id: String,
        /// What will be executed.
        description: String,
        /// Project the task targets.
        project: String,
    },
    /// Execution progress; `edit` refers to a previously posted progress message.
    Progress {
        /// Message to update in place, if the transport supports edits.
        edit: Option<MessageRef>,
        /// Task being reported.
        task_id: String,
        /// Current phase.
        phase: String,
        /// Completion estimate.
        percent: u8,
        /// Detail line.
        detail: String,
    },
    /// Final execution report.
    Result {
        /// Finished task.
        task_id: String,
        /// Whether the run succeeded.
        success: bool,
        /// Output or error text.
        output: String,
        /// Review artifact, if one was produced.
        artifact_url: Option<String>,
    },
}

impl Reply {
    /// Shorthand for [`Reply::Text`].
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Split `text` into pieces of at most `max_chars` characters.
///
/// Breaks at the last newline in the second half of a window when there is
/// one, so long answers split between paragraphs rather than mid-line.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining: Vec<char> = text.trim().chars().collect();

    while remaining.len() > max_chars {
        let window = &remaining[..max_chars];
        let split = window
            .iter()
            .rposition(|c| *c == '\n')
            .filter(|idx| *idx > max_chars / 2)
            .map_or(max_chars, |idx| idx + 1);
        let head: String = remaining[..split].iter().collect();
        chunks.push(head.trim().to_owned());
        let tail: String = remaining[split..].iter().collect();
        remaining = tail.trim().chars().collect();
    }
    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.into_iter().collect());
    }
    chunks
}

/// Outbound side of a messaging transport.
pub trait Messenger: Send + Sync {
    /// Deliver `reply` to a conversation.
    ///
    /// Returns a reference to the posted message when the transport
    /// supports later edits.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) if delivery fails.
    fn send<'a>(
        &'a self,
        conversation_id: &'a str,
        reply: Reply,
    ) -> Pin<Box<dyn Future<Output = Result<Option<MessageRef>>> + Send + 'a>>;

    /// Longest text a single message may carry.
    fn max_message_length(&self) -> usize {
        4096
    }
}

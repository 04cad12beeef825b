//! Per-conversation task state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A proposed task awaiting operator confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PendingTask {
    /// Generated task identifier.
    pub task_id: String,
    /// Full description handed to the executor on confirmation.
    pub description: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Sender that proposed the task.
    pub sender_id: String,
    /// Transport reference of the confirmation prompt, if one was posted.
    pub confirmation_ref: Option<String>,
    /// How the finished task should treat review artifacts.
    pub policy: ArtifactPolicy,
    /// Proposal time; drives expiry.
    pub created_at: DateTime<Utc>,
}

/// A task whose execution is in flight.
#[derive(Debug, Clone)]
pub struct RunningTask {
    /// Task identifier shared with the executor.
    pub task_id: String,
    /// Short description for status output.
    pub title: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Execution start time.
    pub started_at: DateTime<Utc>,
    /// Cancels the local execution unit.
    pub cancel: CancellationToken,
}

/// Caller override for durable artifact creation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactPolicy {
    /// Let the ephemeral-task heuristic decide.
    #[default]
    Auto,
    /// Always produce a reviewable artifact.
    Durable,
    /// Never produce a reviewable artifact.
    Ephemeral,
}

/// Read-only view of a conversation's task state.
#[derive(Debug, Clone, Default)]
pub struct TaskSnapshot {
    /// Proposal awaiting confirmation.
    pub pending: Option<PendingTask>,
    /// Execution in flight.
    pub running: Option<RunningTask>,
}

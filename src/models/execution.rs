//! Types exchanged with the execution collaborator.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work handed to the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecTask {
    /// Task identifier.
    pub id: String,
    /// Short title for logs and reports.
    pub title: String,
    /// Prompt or description given to the executor.
    pub description: String,
    /// Working directory.
    pub project_path: PathBuf,
    /// Branch to commit to; empty for read-only or ephemeral runs.
    pub branch: String,
    /// Branch the work is based on; empty when `branch` is empty.
    pub base_branch: String,
    /// Whether a reviewable artifact (pull request) should be produced.
    pub create_pr: bool,
    /// Resolved team member identity; empty means unrestricted.
    pub member_id: String,
}

/// Outcome reported by the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured output.
    pub output: String,
    /// Whether the executor considers the run successful.
    pub success: bool,
    /// Link to the produced artifact, if any.
    pub artifact_url: Option<String>,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// A progress notification emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Task the event belongs to.
    pub task_id: String,
    /// Phase name, e.g. `Implementing`.
    pub phase: String,
    /// Completion estimate, 0..=100.
    pub percent: u8,
    /// Free-form detail line.
    pub message: String,
}

/// Row recorded in the execution history store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionRecord {
    /// Record identifier.
    pub id: String,
    /// Task identifier.
    pub task_id: String,
    /// Conversation that requested the task.
    pub conversation_id: String,
    /// Short description.
    pub title: String,
    /// Final status.
    pub success: bool,
    /// Artifact link, if produced.
    pub artifact_url: Option<String>,
    /// Run duration in milliseconds.
    pub duration_ms: u64,
    /// Completion time.
    pub finished_at: DateTime<Utc>,
}

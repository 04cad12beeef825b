//! Tunable heuristics that encode product policy.
//!
//! Fast-path question detection and ephemeral-task detection live behind
//! [`TaskPolicy`] so the classifier and the task manager can be tested
//! against alternative rule sets.

pub mod keyword;

pub use keyword::KeywordPolicy;

/// Lexical heuristics consulted during classification and execution.
pub trait TaskPolicy: Send + Sync {
    /// Whether `text` is unambiguously a question and should skip remote
    /// classification.
    fn is_clear_question(&self, text: &str) -> bool;

    /// Whether a task description looks like a run/inspect command that
    /// should not produce a durable review artifact.
    fn is_ephemeral(&self, description: &str) -> bool;
}

//! Intent classification fallback chain.
//!
//! Order, each step short-circuiting:
//! 1. leading `/` is a command;
//! 2. the policy's clear-question heuristic;
//! 3. the remote classifier under a deadline;
//! 4. local keyword rules.
//!
//! Remote failures never reach the caller; they only select step 4.

pub mod remote;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info_span, Instrument};

use crate::models::intent::Intent;
use crate::models::message::ConversationMessage;
use crate::models::truncate_chars;
use crate::policy::TaskPolicy;

pub use remote::{AnthropicClassifier, RemoteClassifier, RemoteVerdict};
pub use rules::RuleClassifier;

/// Which step of the chain produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    /// Slash-command prefix.
    Command,
    /// Clear-question heuristic.
    Heuristic,
    /// Remote classifier verdict.
    Remote,
    /// Local keyword rules.
    Rules,
}

/// Outcome of [`IntentClassifier::classify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Resolved intent.
    pub intent: Intent,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f64,
    /// Short explanation.
    pub reasoning: String,
    /// Execution context for task intents; empty when not provided.
    pub task_summary: String,
    /// Deciding step.
    pub source: ClassificationSource,
}

impl Classification {
    fn local(
        intent: Intent,
        confidence: f64,
        reasoning: &str,
        source: ClassificationSource,
    ) -> Self {
        Self {
            intent,
            confidence,
            reasoning: reasoning.to_owned(),
            task_summary: String::new(),
            source,
        }
    }
}

/// Stateless classifier combining heuristics, an optional remote model, and rules.
pub struct IntentClassifier {
    rules: RuleClassifier,
    policy: Arc<dyn TaskPolicy>,
    remote: Option<Arc<dyn RemoteClassifier>>,
    timeout: Duration,
}

impl IntentClassifier {
    /// Build a classifier; `remote` of `None` skips step 3.
    #[must_use]
    pub fn new(
        policy: Arc<dyn TaskPolicy>,
        remote: Option<Arc<dyn RemoteClassifier>>,
        timeout: Duration,
    ) -> Self {
        Self {
            rules: RuleClassifier::new(),
            policy,
            remote,
            timeout,
        }
    }

    /// Whether a remote classifier is wired in.
    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Local keyword rules, also used directly by callers that must not wait.
    #[must_use]
    pub fn rules(&self) -> &RuleClassifier {
        &self.rules
    }

    /// Classify `text` given the conversation's prior `history`.
    pub async fn classify(&self, text: &str, history: &[ConversationMessage]) -> Classification {
        let trimmed = text.trim();

        if trimmed.starts_with('/') {
            return Classification::local(
                Intent::Command,
                1.0,
                "command prefix",
                ClassificationSource::Command,
            );
        }

        if self.policy.is_clear_question(trimmed) {
            return Classification::local(
                Intent::Question,
                0.9,
                "clear question pattern",
                ClassificationSource::Heuristic,
            );
        }

        if let Some(remote) = &self.remote {
            let span = info_span!("remote_classify", history = history.len());
            let outcome = self
                .classify_remote(remote.as_ref(), trimmed, history)
                .instrument(span)
                .await;
            match outcome {
                Ok(verdict) => {
                    debug!(
                        text = %truncate_chars(trimmed, 50),
                        intent = %verdict.intent,
                        confidence = verdict.confidence,
                        "remote classification"
                    );
                    return Classification {
                        intent: verdict.intent,
                        confidence: verdict.confidence,
                        reasoning: verdict.reasoning,
                        task_summary: verdict.task_summary,
                        source: ClassificationSource::Remote,
                    };
                }
                Err(err) => {
                    debug!(%err, "remote classification failed, using rules");
                }
            }
        }

        Classification::local(
            self.rules.classify(trimmed),
            0.5,
            "keyword rules",
            ClassificationSource::Rules,
        )
    }

    async fn classify_remote(
        &self,
        remote: &dyn RemoteClassifier,
        text: &str,
        history: &[ConversationMessage],
    ) -> crate::Result<RemoteVerdict> {
        let prompt = remote::build_prompt(text, history);
        let raw = tokio::time::timeout(self.timeout, remote.complete(&prompt))
            .await
            .map_err(|_| {
                crate::AppError::Classifier(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;
        remote::parse_response(&raw)
    }
}

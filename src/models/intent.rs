//! Classified purpose of an inbound message.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Intent resolved for a user message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Slash command such as `/status`.
    Command,
    /// Casual greeting.
    Greeting,
    /// Question about the codebase.
    Question,
    /// Read-only analysis request.
    Research,
    /// Request for an implementation plan.
    Planning,
    /// Conversation without action intent.
    Chat,
    /// Request to change code.
    Task,
}

impl Intent {
    /// Wire label used in classifier responses and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Greeting => "greeting",
            Self::Question => "question",
            Self::Research => "research",
            Self::Planning => "planning",
            Self::Chat => "chat",
            Self::Task => "task",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Command => "Command",
            Self::Greeting => "Greeting",
            Self::Question => "Question",
            Self::Research => "Research",
            Self::Planning => "Planning",
            Self::Chat => "Chat",
            Self::Task => "Task",
        }
    }

    /// Map a free-form label to an intent.
    ///
    /// Matching is case-insensitive. Anything unrecognised maps to
    /// [`Intent::Chat`] so garbled output never triggers execution.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "command" => Self::Command,
            "greeting" => Self::Greeting,
            "question" => Self::Question,
            "research" => Self::Research,
            "planning" => Self::Planning,
            "task" => Self::Task,
            _ => Self::Chat,
        }
    }

    /// Whether the intent is served by a read-only analysis run.
    #[must_use]
    pub fn is_analysis(self) -> bool {
        matches!(self, Self::Question | Self::Research | Self::Planning)
    }
}

impl Display for Intent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Default keyword-based [`TaskPolicy`].

use super::TaskPolicy;

/// Openers that rarely start a change request.
const CLEAR_QUESTION_STARTERS: &[&str] = &[
    "what's in",
    "what is in",
    "whats in",
    "what's the",
    "what is the",
    "whats the",
    "how does",
    "how do",
    "how can",
    "where is",
    "where are",
    "where's",
    "why is",
    "why are",
    "why does",
    "when is",
    "when does",
    "when will",
    "who is",
    "who are",
    "which",
    "can you explain",
    "could you explain",
    "check the status",
    "check status",
];

const EPHEMERAL_START: &[&str] = &[
    "serve",
    "run",
    "start",
    "launch",
    "boot",
    "npm run",
    "yarn",
    "pnpm",
    "cargo run",
    "go run",
    "python -m",
    "make dev",
    "make serve",
    "make run",
    "make start",
];

const EPHEMERAL_CONTAINS: &[&str] = &[
    "dev server",
    "local server",
    "localhost",
    "development server",
    "preview server",
];

/// Verbs that only count when the description is short.
const EPHEMERAL_STANDALONE: &[&str] = &[
    "check", "test", "validate", "verify", "lint", "format", "build", "compile", "bundle",
];

const POLITE_PREFIXES: &[&str] = &["please ", "can you ", "could you ", "i need to ", "i want to "];

const MODIFICATION_WORDS: &[&str] = &[
    "fix",
    "add",
    "update",
    "change",
    "modify",
    "write",
    "create",
    "implement",
    "refactor",
];

/// Maximum word count for the standalone-verb rule.
const STANDALONE_MAX_WORDS: usize = 4;

/// Keyword and phrase matching over lowercased text.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordPolicy;

impl KeywordPolicy {
    /// Whether the description implies code changes.
    #[must_use]
    pub fn contains_modification_intent(description: &str) -> bool {
        let lower = description.to_lowercase();
        MODIFICATION_WORDS.iter().any(|word| lower.contains(word))
    }
}

impl TaskPolicy for KeywordPolicy {
    fn is_clear_question(&self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();
        if lower.ends_with('?') {
            return true;
        }
        CLEAR_QUESTION_STARTERS
            .iter()
            .any(|starter| lower.starts_with(starter))
    }

    fn is_ephemeral(&self, description: &str) -> bool {
        let desc = description.trim().to_lowercase();
        if desc.is_empty() || Self::contains_modification_intent(&desc) {
            return false;
        }

        let starts = EPHEMERAL_START.iter().any(|pattern| {
            desc.starts_with(pattern)
                || POLITE_PREFIXES.iter().any(|prefix| {
                    desc.strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with(pattern))
                })
        });
        if starts {
            return true;
        }

        if EPHEMERAL_CONTAINS.iter().any(|pattern| desc.contains(pattern)) {
            return true;
        }

        // "fix the test" style descriptions are long enough to skip this.
        desc.split_whitespace().count() <= STANDALONE_MAX_WORDS
            && EPHEMERAL_STANDALONE.iter().any(|verb| {
                desc == *verb
                    || desc
                        .strip_prefix(verb)
                        .is_some_and(|rest| rest.starts_with(' '))
            })
    }
}

//! Deterministic keyword classifier used when no remote verdict is available.
//!
//! Rules are evaluated in priority order:
//! command, greeting, research, planning, opinion chat, question, task.
//! Anything unmatched is chat, never task.

use regex::Regex;

use crate::models::intent::Intent;

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "hola",
    "yo",
    "sup",
    "good morning",
    "good afternoon",
    "good evening",
    "howdy",
    "greetings",
    "what's up",
    "whats up",
];

const QUESTION_STARTERS: &[&str] = &[
    "what is",
    "what are",
    "what's",
    "whats",
    "what does",
    "what do",
    "how do",
    "how does",
    "how can",
    "how to",
    "where is",
    "where are",
    "where's",
    "why is",
    "why are",
    "why does",
    "when is",
    "when does",
    "when will",
    "which",
    "who is",
    "who are",
    "can you tell",
    "could you explain",
    "do you know",
    "is there",
    "are there",
];

const QUICK_INFO_KEYWORDS: &[&str] = &[
    "issues", "tasks", "backlog", "todos", "fixmes", "status", "progress", "state",
];

const QUESTION_PHRASES: &[&str] = &[
    "tell me about",
    "explain",
    "describe",
    "show me",
    "list all",
    "find all",
    "list",
];

const CHAT_PHRASES: &[&str] = &[
    "what do you think",
    "opinion on",
    "thoughts about",
    "do you recommend",
    "should i",
    "is it better",
    "discuss",
    "let's talk about",
    "lets talk about",
];

const RESEARCH_WORDS: &[&str] = &[
    "research",
    "analyze",
    "review",
    "investigate",
    "summarize",
    "compare",
    "evaluate",
    "assess",
];

const PLANNING_WORDS: &[&str] = &[
    "plan",
    "design",
    "strategy",
    "how should we",
    "approach for",
    "architect",
    "outline",
];

const ACTION_WORDS: &[&str] = &[
    "create",
    "add",
    "make",
    "build",
    "implement",
    "fix",
    "update",
    "modify",
    "change",
    "edit",
    "delete",
    "remove",
    "refactor",
    "write",
    "generate",
    "setup",
    "configure",
    "install",
    "prioritize",
    "reprioritize",
    "reorder",
    "sort",
    "organize",
    "rank",
    "triage",
    "set priority",
];

/// Maximum words in a message treated as a bare greeting.
const GREETING_MAX_WORDS: usize = 3;

/// Ordered keyword rules.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    action: Option<Regex>,
    research: Option<Regex>,
    planning: Option<Regex>,
    backlog_ref: Option<Regex>,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleClassifier {
    /// Compile the rule set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            action: directive_regex(ACTION_WORDS),
            research: directive_regex(RESEARCH_WORDS),
            planning: word_regex(PLANNING_WORDS),
            backlog_ref: Regex::new(r"(?:\btask[- ]?\d+|#\d+)").ok(),
        }
    }

    /// Classify `text` without any remote help.
    #[must_use]
    pub fn classify(&self, text: &str) -> Intent {
        let msg = text.trim().to_lowercase();

        if msg.starts_with('/') {
            return Intent::Command;
        }
        if is_greeting(&msg) {
            return Intent::Greeting;
        }
        if matches(self.research.as_ref(), &msg) {
            return Intent::Research;
        }
        if matches(self.planning.as_ref(), &msg) {
            return Intent::Planning;
        }
        let has_action = self.contains_action_word(&msg);
        if !has_action && CHAT_PHRASES.iter().any(|p| msg.contains(p)) {
            return Intent::Chat;
        }
        if self.is_question(&msg, has_action) {
            return Intent::Question;
        }
        if has_action || matches(self.backlog_ref.as_ref(), &msg) {
            return Intent::Task;
        }
        Intent::Chat
    }

    /// Whether `text` carries a directive action verb ("fix", "please add", ...).
    #[must_use]
    pub fn contains_action_word(&self, text: &str) -> bool {
        matches(self.action.as_ref(), &text.to_lowercase())
    }

    fn is_question(&self, msg: &str, has_action: bool) -> bool {
        if msg.ends_with('?') || QUESTION_STARTERS.iter().any(|s| msg.starts_with(s)) {
            return true;
        }
        if has_action {
            return false;
        }
        QUICK_INFO_KEYWORDS.iter().any(|k| msg.contains(k))
            || QUESTION_PHRASES.iter().any(|p| msg.contains(p))
    }
}

fn is_greeting(msg: &str) -> bool {
    if msg.split_whitespace().count() > GREETING_MAX_WORDS {
        return false;
    }
    GREETINGS.iter().any(|greeting| {
        msg == *greeting
            || msg
                .strip_prefix(greeting)
                .is_some_and(|rest| rest.starts_with([' ', '!', ',']))
    })
}

fn matches(re: Option<&Regex>, msg: &str) -> bool {
    re.is_some_and(|re| re.is_match(msg))
}

/// Word at the start of the message or after a polite lead-in.
fn directive_regex(words: &[&str]) -> Option<Regex> {
    let alternatives = alternation(words);
    Regex::new(&format!(
        r"(?:^|\bplease |\bcan you |\bi need |\bi want )(?:{alternatives})\b"
    ))
    .ok()
}

/// Whole-word match anywhere in the message.
fn word_regex(words: &[&str]) -> Option<Regex> {
    let alternatives = alternation(words);
    Regex::new(&format!(r"\b(?:{alternatives})\b")).ok()
}

fn alternation(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|")
}

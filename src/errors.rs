//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Which admission bucket rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Inbound message intake.
    Message,
    /// Task submission.
    Task,
}

impl Display for LimitKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message => f.write_str("message"),
            Self::Task => f.write_str("task"),
        }
    }
}

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A pending or running task already occupies the conversation.
    Conflict(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Admission control denied the request.
    RateLimited(LimitKind),
    /// Remote intent classification failure.
    Classifier(String),
    /// Execution collaborator failure.
    Executor(String),
    /// Messaging transport failure.
    Transport(String),
    /// Execution history store failure.
    Store(String),
    /// Caller is not authorized to perform the requested action.
    Unauthorized(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::RateLimited(kind) => write!(f, "rate limited: {kind} limit exceeded"),
            Self::Classifier(msg) => write!(f, "classifier: {msg}"),
            Self::Executor(msg) => write!(f, "executor: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Store(msg) => write!(f, "store: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Classifier(err.to_string())
    }
}

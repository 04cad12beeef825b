//! Global configuration parsing, validation, and credential loading.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name used for credential lookup.
pub const KEYRING_SERVICE: &str = "pilot-orchestrator";

/// Default Anthropic messages endpoint used by the remote classifier.
pub const DEFAULT_CLASSIFIER_URL: &str = "https://api.anthropic.com/v1/messages";

/// Token-bucket admission control settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// When `false`, every admission check succeeds.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sustained inbound message rate per identity.
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
    /// Sustained task submission rate per identity.
    #[serde(default = "default_tasks_per_hour")]
    pub tasks_per_hour: u32,
    /// Maximum number of back-to-back requests.
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            messages_per_minute: default_messages_per_minute(),
            tasks_per_hour: default_tasks_per_hour(),
            burst_size: default_burst_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_messages_per_minute() -> u32 {
    20
}

fn default_tasks_per_hour() -> u32 {
    10
}

fn default_burst_size() -> u32 {
    5
}

/// Remote intent classifier settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClassifierConfig {
    /// Whether the remote classifier is consulted at all.
    #[serde(default)]
    pub enabled: bool,
    /// Model identifier sent with each classification request.
    #[serde(default = "default_classifier_model")]
    pub model: String,
    /// Upper bound on a single remote classification.
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
    /// Messages retained per conversation for classifier context.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Idle time after which a conversation's history is dropped.
    #[serde(default = "default_history_ttl_seconds")]
    pub history_ttl_seconds: u64,
    /// Endpoint of the messages API.
    #[serde(default = "default_classifier_url")]
    pub api_url: String,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_classifier_model(),
            timeout_ms: default_classifier_timeout_ms(),
            max_history: default_max_history(),
            history_ttl_seconds: default_history_ttl_seconds(),
            api_url: default_classifier_url(),
            api_key: String::new(),
        }
    }
}

impl ClassifierConfig {
    /// Remote classification deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Conversation history time-to-live.
    #[must_use]
    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_seconds)
    }
}

fn default_classifier_model() -> String {
    "claude-3-haiku-20240307".into()
}

fn default_classifier_timeout_ms() -> u64 {
    2000
}

fn default_max_history() -> usize {
    10
}

fn default_history_ttl_seconds() -> u64 {
    1800
}

fn default_classifier_url() -> String {
    DEFAULT_CLASSIFIER_URL.into()
}

/// Per-intent execution timeouts (seconds) for read-only analysis.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Codebase question answering.
    #[serde(default = "default_question_seconds")]
    pub question_seconds: u64,
    /// Research and analysis requests.
    #[serde(default = "default_research_seconds")]
    pub research_seconds: u64,
    /// Implementation plan drafting.
    #[serde(default = "default_planning_seconds")]
    pub planning_seconds: u64,
    /// Conversational replies.
    #[serde(default = "default_chat_seconds")]
    pub chat_seconds: u64,
    /// Confirmed task execution; 0 means no timeout.
    #[serde(default)]
    pub task_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            question_seconds: default_question_seconds(),
            research_seconds: default_research_seconds(),
            planning_seconds: default_planning_seconds(),
            chat_seconds: default_chat_seconds(),
            task_seconds: 0,
        }
    }
}

fn default_question_seconds() -> u64 {
    90
}

fn default_research_seconds() -> u64 {
    180
}

fn default_planning_seconds() -> u64 {
    120
}

fn default_chat_seconds() -> u64 {
    60
}

/// Task lifecycle settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TaskConfig {
    /// Skip durable artifacts for tasks that look like run/inspect commands.
    #[serde(default = "default_true")]
    pub detect_ephemeral: bool,
    /// Age after which an unconfirmed proposal expires.
    #[serde(default = "default_pending_ttl_seconds")]
    pub pending_ttl_seconds: u64,
    /// Interval of the background expiry sweep.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    /// Branch that durable task branches are cut from.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            detect_ephemeral: true,
            pending_ttl_seconds: default_pending_ttl_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            base_branch: default_base_branch(),
        }
    }
}

impl TaskConfig {
    /// Pending proposal lifetime.
    #[must_use]
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_seconds)
    }

    /// Sweep cadence.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn default_pending_ttl_seconds() -> u64 {
    300
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_base_branch() -> String {
    "main".into()
}

fn default_host_cli() -> String {
    "claude".into()
}

fn default_host_cli_args() -> Vec<String> {
    vec!["--print".into()]
}

fn default_task_id_prefix() -> String {
    "TG".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Project directory the execution collaborator works in.
    pub project_path: PathBuf,
    /// Host CLI binary that performs executions (e.g., `claude`).
    #[serde(default = "default_host_cli")]
    pub host_cli: String,
    /// Arguments passed to the host CLI before the prompt.
    #[serde(default = "default_host_cli_args")]
    pub host_cli_args: Vec<String>,
    /// Conversation or sender IDs allowed to talk to the bot. Empty allows all.
    #[serde(default)]
    pub authorized_ids: Vec<String>,
    /// Prefix for generated task identifiers.
    #[serde(default = "default_task_id_prefix")]
    pub task_id_prefix: String,
    /// Admission control.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Remote intent classifier.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Analysis timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Task lifecycle.
    #[serde(default)]
    pub tasks: TaskConfig,
    /// Sender ID to team member ID mapping.
    #[serde(default)]
    pub members: HashMap<String, String>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the classifier API key from OS keychain with env-var fallback.
    ///
    /// A missing key is not fatal: the remote classifier is disabled and
    /// classification falls back to local rules.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain lookup task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if !self.classifier.enabled {
            return Ok(());
        }
        match load_credential("anthropic_api_key", "ANTHROPIC_API_KEY").await? {
            Some(key) => self.classifier.api_key = key,
            None => {
                warn!("classifier enabled but ANTHROPIC_API_KEY not set, falling back to rules");
                self.classifier.enabled = false;
            }
        }
        Ok(())
    }

    /// Whether a conversation or sender may use the bot.
    ///
    /// An empty allowlist admits everyone.
    #[must_use]
    pub fn is_authorized(&self, conversation_id: &str, sender_id: &str) -> bool {
        self.authorized_ids.is_empty()
            || self
                .authorized_ids
                .iter()
                .any(|id| id == conversation_id || id == sender_id)
    }

    /// Directory holding backlog task files.
    #[must_use]
    pub fn backlog_dir(&self) -> PathBuf {
        self.project_path.join(".agent").join("tasks")
    }

    fn validate(&mut self) -> Result<()> {
        if self.rate_limit.enabled
            && (self.rate_limit.messages_per_minute == 0
                || self.rate_limit.tasks_per_hour == 0
                || self.rate_limit.burst_size == 0)
        {
            return Err(AppError::Config(
                "rate_limit rates and burst_size must be greater than zero".into(),
            ));
        }

        if self.classifier.timeout_ms == 0 {
            return Err(AppError::Config(
                "classifier.timeout_ms must be greater than zero".into(),
            ));
        }

        if self.classifier.max_history == 0 {
            return Err(AppError::Config(
                "classifier.max_history must be greater than zero".into(),
            ));
        }

        if self.host_cli.trim().is_empty() {
            return Err(AppError::Config("host_cli must not be empty".into()));
        }

        let canonical_root = self
            .project_path
            .canonicalize()
            .map_err(|err| AppError::Config(format!("project_path invalid: {err}")))?;
        self.project_path = canonical_root;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.is_empty()))
}

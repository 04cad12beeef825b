//! Remote LLM-backed intent classification.
//!
//! The remote side receives one rendered prompt and answers with a JSON
//! object `{intent, confidence, reasoning, task_summary}`, optionally
//! wrapped in a fenced code block.

use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::models::intent::Intent;
use crate::models::message::{ConversationMessage, Role};
use crate::models::truncate_chars;
use crate::{AppError, Result};

/// Messages API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Token budget for a classification answer.
const MAX_TOKENS: u32 = 256;

/// History entries embedded in the prompt.
pub const PROMPT_HISTORY_LIMIT: usize = 5;

/// Per-entry character budget for prompt history.
pub const PROMPT_HISTORY_CHARS: usize = 150;

/// Collaborator that turns a rendered prompt into raw completion text.
pub trait RemoteClassifier: Send + Sync {
    /// Send `prompt` and return the raw answer text.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Classifier`] on transport or API failure.
    fn complete(&self, prompt: &str) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// Parsed remote answer.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVerdict {
    /// Mapped intent; unknown labels become chat.
    pub intent: Intent,
    /// Model confidence clamped to `0.0..=1.0`.
    pub confidence: f64,
    /// Short explanation.
    pub reasoning: String,
    /// Execution context distilled from the conversation.
    pub task_summary: String,
}

#[derive(Debug, Deserialize)]
struct VerdictJson {
    intent: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    task_summary: String,
}

/// Parse a remote answer, tolerating a surrounding code fence.
///
/// # Errors
///
/// Returns [`AppError::Classifier`] if the payload is not the expected JSON object.
pub fn parse_response(raw: &str) -> Result<RemoteVerdict> {
    let mut body = raw.trim();
    body = body.strip_prefix("```json").unwrap_or(body);
    body = body.strip_prefix("```").unwrap_or(body);
    body = body.strip_suffix("```").unwrap_or(body);
    let body = body.trim();

    let parsed: VerdictJson = serde_json::from_str(body).map_err(|err| {
        AppError::Classifier(format!(
            "invalid classification json: {err} (response: {})",
            truncate_chars(&body.replace('\n', " "), 200)
        ))
    })?;

    Ok(RemoteVerdict {
        intent: Intent::from_label(&parsed.intent),
        confidence: parsed.confidence.clamp(0.0, 1.0),
        reasoning: parsed.reasoning,
        task_summary: parsed.task_summary,
    })
}

/// Render the classification prompt for `message` given prior history.
#[must_use]
pub fn build_prompt(message: &str, history: &[ConversationMessage]) -> String {
    let mut prompt = String::from(
        "You are an intent classifier for a chat bot that manages code tasks.

## Intent Types
- command: Bot commands starting with /
- greeting: Casual greetings (hi, hello, hey)
- question: Questions about the codebase (what, how, where + ?)
- research: Requests to analyze, review, summarize code
- planning: Requests to plan, design, architect solutions
- chat: Conversational/opinion seeking, no action intent
- task: Requests to create, modify, fix, implement code

## Key Classification Rules
1. Casual mentions of action words in reaction context = chat, NOT task
   - \"Wow, let's commit changes first\" (reacting to something) = chat
   - \"Let's commit the authentication changes\" (clear directive) = task
2. \"Check if X happened\" or \"Check the status\" = question, NOT task
3. Ambiguous without clear action intent -> prefer chat over task
4. \"yes\", \"ok\", \"confirm\" after a task suggestion = use context to determine
5. Questions ending with ? are usually questions unless they contain clear task directives

## Conversation Context
",
    );

    if history.is_empty() {
        prompt.push_str("(No prior conversation)\n\n");
    } else {
        prompt.push_str("Recent conversation:\n");
        let skip = history.len().saturating_sub(PROMPT_HISTORY_LIMIT);
        for entry in history.iter().skip(skip) {
            let speaker = match entry.role {
                Role::User => "User",
                Role::Assistant => "Bot",
            };
            let content = truncate_chars(&entry.content, PROMPT_HISTORY_CHARS);
            let _ = writeln!(prompt, "{speaker}: {content}");
        }
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "## Current Message to Classify\n{message}\n");

    prompt.push_str(
        "## Response Format
Respond with ONLY a JSON object (no markdown, no explanation):
{\"intent\": \"...\", \"confidence\": 0.0-1.0, \"reasoning\": \"brief explanation\", \"task_summary\": \"context for task execution if applicable\"}

If intent is \"task\", include a task_summary that captures the full context from the conversation for execution.
",
    );

    prompt
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// [`RemoteClassifier`] backed by the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClassifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClassifier {
    /// Build a client from classifier configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if no API key is loaded or the HTTP
    /// client cannot be built.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AppError::Config("classifier api key is not loaded".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Classifier(format!(
                "api error (status {status}): {}",
                truncate_chars(&body, 200)
            )));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|err| AppError::Classifier(format!("failed to parse response: {err}")))?;
        if let Some(api_error) = parsed.error {
            return Err(AppError::Classifier(format!("api error: {}", api_error.message)));
        }
        let text = parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| AppError::Classifier("empty response content".into()))?;
        debug!(len = text.len(), "remote classifier answered");
        Ok(text)
    }
}

impl RemoteClassifier for AnthropicClassifier {
    fn complete(&self, prompt: &str) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let prompt = prompt.to_owned();
        Box::pin(async move { self.call(&prompt).await })
    }
}

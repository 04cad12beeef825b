//! Read-only analysis runs: questions, research, planning and chat.
//!
//! Each run goes through the execution collaborator with a prompt that
//! forbids changes, no branch, and no review artifact. Planning output is
//! turned into a pending proposal.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Dispatcher;
use crate::models::execution::{ExecResult, ExecTask};
use crate::models::intent::Intent;
use crate::models::truncate_chars;
use crate::Result;

/// Assistant replies are stored in history at this length.
const HISTORY_REPLY_CHARS: usize = 500;

/// Progress events from analysis runs are drained, never forwarded.
const ANALYSIS_PROGRESS_BUFFER: usize = 16;

/// Static description of one analysis kind.
struct AnalysisKind {
    id_prefix: &'static str,
    title_prefix: &'static str,
    title_chars: usize,
    ack: &'static str,
    timed_out: &'static str,
}

fn kind_for(intent: Intent) -> AnalysisKind {
    match intent {
        Intent::Research => AnalysisKind {
            id_prefix: "RES",
            title_prefix: "Research: ",
            title_chars: 40,
            ack: "🔬 Researching...",
            timed_out: "⏱ Research timed out. Try a more specific query.",
        },
        Intent::Planning => AnalysisKind {
            id_prefix: "PLAN",
            title_prefix: "Plan: ",
            title_chars: 40,
            ack: "📐 Drafting plan...",
            timed_out: "⏱ Planning timed out. Try a simpler request.",
        },
        Intent::Chat => AnalysisKind {
            id_prefix: "CHAT",
            title_prefix: "Chat: ",
            title_chars: 30,
            ack: "💬 Thinking...",
            timed_out: "⏱ Took too long to respond. Try a simpler question.",
        },
        _ => AnalysisKind {
            id_prefix: "Q",
            title_prefix: "Question: ",
            title_chars: 40,
            ack: "🔍 Looking into that...",
            timed_out: "⏱ Question timed out. Try asking something more specific.",
        },
    }
}

/// Render the read-only prompt for an analysis intent.
#[must_use]
pub fn build_prompt(intent: Intent, text: &str, project: &str) -> String {
    match intent {
        Intent::Research => format!(
            "Research and analyze: {text}\n\n\
             Provide findings in a structured format with:\n\
             - Executive summary\n\
             - Key findings\n\
             - Relevant code/files if applicable\n\
             - Recommendations\n\n\
             DO NOT make any code changes. This is a read-only research task."
        ),
        Intent::Planning => format!(
            "Create an implementation plan for: {text}\n\n\
             Explore the codebase and propose a detailed plan. Include:\n\
             1. Summary of approach\n\
             2. Files to modify/create\n\
             3. Step-by-step implementation phases\n\
             4. Potential risks or considerations\n\n\
             DO NOT make any code changes. Only explore and plan."
        ),
        Intent::Chat => format!(
            "You are Pilot, an AI assistant for the codebase at {project}.\n\n\
             The user wants to have a conversation (not execute a task).\n\
             Respond helpfully and conversationally. You can reference project knowledge \
             but DO NOT make code changes.\n\n\
             Be concise - this is a chat conversation, not a report. \
             Keep response under 500 words.\n\n\
             User message: {text}"
        ),
        _ => format!(
            "Answer this question about the codebase. DO NOT make any changes, \
             only read and analyze.\n\n\
             Question: {text}\n\n\
             IMPORTANT: Be concise. Limit your exploration to 5-10 files max. \
             Provide a brief, direct answer.\n\
             If the question is too broad, ask for clarification instead of exploring everything."
        ),
    }
}

enum RunOutcome {
    Finished(Result<ExecResult>),
    TimedOut,
}

impl Dispatcher {
    fn analysis_timeout(&self, intent: Intent) -> Duration {
        let timeouts = &self.state.config.timeouts;
        let secs = match intent {
            Intent::Research => timeouts.research_seconds,
            Intent::Planning => timeouts.planning_seconds,
            Intent::Chat => timeouts.chat_seconds,
            _ => timeouts.question_seconds,
        };
        Duration::from_secs(secs)
    }

    /// Run a read-only analysis for a question, research, planning or chat message.
    pub(crate) async fn run_analysis(
        &self,
        conversation_id: &str,
        sender_id: &str,
        intent: Intent,
        text: &str,
    ) {
        let kind = kind_for(intent);
        self.reply(conversation_id, kind.ack).await;

        let project = self.state.tasks.project_path().to_path_buf();
        let task = ExecTask {
            id: format!("{}-{}", kind.id_prefix, Utc::now().timestamp()),
            title: format!(
                "{}{}",
                kind.title_prefix,
                truncate_chars(text, kind.title_chars)
            ),
            description: build_prompt(intent, text, &project.display().to_string()),
            project_path: project,
            create_pr: false,
            ..ExecTask::default()
        };
        let task_id = task.id.clone();
        let limit = self.analysis_timeout(intent);
        if intent == Intent::Question {
            debug!(conversation_id, task_id, "answering question");
        } else {
            info!(conversation_id, task_id, %intent, "running analysis");
        }

        match self.execute_bounded(task, limit).await {
            RunOutcome::TimedOut => {
                warn!(conversation_id, task_id, "analysis timed out");
                self.reply(conversation_id, kind.timed_out).await;
            }
            RunOutcome::Finished(Err(err)) => {
                warn!(conversation_id, task_id, %err, "analysis failed");
                let notice = match intent {
                    Intent::Research => format!("❌ Research failed: {err}"),
                    Intent::Planning => format!("❌ Planning failed: {err}"),
                    Intent::Chat => "Sorry, I couldn't process that. Try rephrasing?".to_owned(),
                    _ => "❌ Sorry, I couldn't answer that question. Try rephrasing it.".to_owned(),
                };
                self.reply(conversation_id, notice).await;
            }
            RunOutcome::Finished(Ok(result)) => {
                let output = result.output.trim();
                self.deliver(conversation_id, sender_id, intent, text, output)
                    .await;
            }
        }
    }

    async fn deliver(
        &self,
        conversation_id: &str,
        sender_id: &str,
        intent: Intent,
        request: &str,
        output: &str,
    ) {
        match intent {
            Intent::Research => {
                if output.is_empty() {
                    self.reply(conversation_id, "Research completed but produced no output.")
                        .await;
                    return;
                }
                self.reply_chunked(conversation_id, output).await;
            }
            Intent::Planning => {
                if output.is_empty() {
                    self.reply(conversation_id, "Planning completed but produced no output.")
                        .await;
                    return;
                }
                if let Err(err) = self
                    .state
                    .tasks
                    .propose_plan(conversation_id, sender_id, output, request)
                    .await
                {
                    self.report_task_error(conversation_id, &err).await;
                    return;
                }
            }
            Intent::Chat => {
                let response = if output.is_empty() {
                    "I'm not sure how to respond to that. Could you rephrase?".to_owned()
                } else {
                    truncate_chars(output, self.state.messenger.max_message_length())
                };
                self.reply(conversation_id, response.clone()).await;
                self.state.conversations.add_assistant_message(
                    conversation_id,
                    &truncate_chars(&response, HISTORY_REPLY_CHARS),
                );
                return;
            }
            _ => {
                let answer = if output.is_empty() {
                    "I couldn't find a clear answer to that question."
                } else {
                    output
                };
                self.reply_chunked(conversation_id, answer).await;
            }
        }
        if !output.is_empty() {
            self.state.conversations.add_assistant_message(
                conversation_id,
                &truncate_chars(output, HISTORY_REPLY_CHARS),
            );
        }
    }

    /// Run `task` under `limit`, draining its progress channel.
    async fn execute_bounded(&self, task: ExecTask, limit: Duration) -> RunOutcome {
        let cancel = self.cancel.child_token();
        let (progress_tx, mut progress_rx) = mpsc::channel(ANALYSIS_PROGRESS_BUFFER);
        let run = tokio::time::timeout(
            limit,
            self.state.executor.execute(task, progress_tx, cancel.clone()),
        );
        let drain = async { while progress_rx.recv().await.is_some() {} };
        let (outcome, ()) = tokio::join!(run, drain);
        match outcome {
            Ok(result) => RunOutcome::Finished(result),
            Err(_) => {
                cancel.cancel();
                RunOutcome::TimedOut
            }
        }
    }
}

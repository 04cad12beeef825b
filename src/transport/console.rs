//! Line-oriented console transport.
//!
//! Input lines are `text` (conversation and sender `local`) or
//! `@conversation[:sender] text`. Replies are written one block per message.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::{InboundMessage, MessageRef, Messenger, Reply};
use crate::dispatch::Dispatcher;
use crate::{AppError, Result};

/// Conversation and sender used for lines without an `@` prefix.
pub const LOCAL_ID: &str = "local";

/// Maximum accepted input line length.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Queued messages per conversation before intake waits.
const CONVERSATION_QUEUE: usize = 32;

/// Parse one console input line.
///
/// Returns `None` for blank lines.
#[must_use]
pub fn parse_line(line: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(rest) = line.strip_prefix('@') {
        let (address, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let (conversation, sender) = address.split_once(':').unwrap_or((address, address));
        let text = text.trim();
        if conversation.is_empty() || text.is_empty() {
            return None;
        }
        let sender = if sender.is_empty() { conversation } else { sender };
        return Some(InboundMessage {
            conversation_id: conversation.to_owned(),
            sender_id: sender.to_owned(),
            text: text.to_owned(),
        });
    }

    Some(InboundMessage {
        conversation_id: LOCAL_ID.to_owned(),
        sender_id: LOCAL_ID.to_owned(),
        text: line.to_owned(),
    })
}

/// Render a reply as console text.
#[must_use]
pub fn render(reply: &Reply) -> String {
    match reply {
        Reply::Text(text) => text.clone(),
        Reply::Confirmation {
            task_id,
            description,
            project,
        } => format!(
            "Task {task_id} ({project})\n\n{description}\n\nReply yes to execute or no to cancel."
        ),
        Reply::Progress {
            task_id,
            phase,
            percent,
            detail,
            ..
        } => format!("[{task_id}] {phase} {percent}% {detail}"),
        Reply::Result {
            task_id,
            success,
            output,
            artifact_url,
        } => {
            let status = if *success { "completed" } else { "failed" };
            let mut text = format!("Task {task_id} {status}\n{output}");
            if let Some(url) = artifact_url {
                text.push_str("\nPR: ");
                text.push_str(url);
            }
            text
        }
    }
}

/// [`Messenger`] that writes rendered replies to an async writer.
pub struct ConsoleMessenger<W> {
    out: Mutex<W>,
    next_ref: AtomicU64,
}

impl<W> ConsoleMessenger<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap `out`.
    #[must_use]
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            next_ref: AtomicU64::new(1),
        }
    }

    async fn write_reply(
        &self,
        conversation_id: &str,
        reply: Reply,
    ) -> Result<Option<MessageRef>> {
        let reference = self.next_ref.fetch_add(1, Ordering::Relaxed).to_string();
        let block = format!("[{conversation_id}] {}\n", render(&reply));
        let mut out = self.out.lock().await;
        out.write_all(block.as_bytes())
            .await
            .map_err(|err| AppError::Transport(format!("console write failed: {err}")))?;
        out.flush()
            .await
            .map_err(|err| AppError::Transport(format!("console flush failed: {err}")))?;
        Ok(Some(reference))
    }
}

impl<W> Messenger for ConsoleMessenger<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn send<'a>(
        &'a self,
        conversation_id: &'a str,
        reply: Reply,
    ) -> Pin<Box<dyn Future<Output = Result<Option<MessageRef>>> + Send + 'a>> {
        Box::pin(self.write_reply(conversation_id, reply))
    }
}

/// Read inbound lines from `input` and hand each one to the dispatcher.
///
/// Each conversation gets its own worker, so messages within a conversation
/// are handled in arrival order while a slow conversation does not block
/// the others. On cancellation or EOF the loop stops reading and waits for
/// queued messages to drain.
pub async fn run_intake<R>(
    input: R,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = FramedRead::new(input, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let handlers = TaskTracker::new();
    let mut workers: HashMap<String, mpsc::Sender<InboundMessage>> = HashMap::new();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("intake: cancellation received, stopping");
                break;
            }

            item = lines.next() => {
                match item {
                    None => {
                        info!("intake: input closed");
                        break;
                    }
                    Some(Err(err)) => {
                        warn!(%err, "intake: unreadable line, skipping");
                    }
                    Some(Ok(line)) => {
                        if let Some(message) = parse_line(&line) {
                            let worker = workers
                                .entry(message.conversation_id.clone())
                                .or_insert_with(|| {
                                    spawn_conversation_worker(&handlers, Arc::clone(&dispatcher))
                                });
                            if worker.send(message).await.is_err() {
                                warn!("intake: conversation worker stopped, dropping message");
                            }
                        }
                    }
                }
            }
        }
    }

    drop(workers);
    handlers.close();
    handlers.wait().await;
}

fn spawn_conversation_worker(
    handlers: &TaskTracker,
    dispatcher: Arc<Dispatcher>,
) -> mpsc::Sender<InboundMessage> {
    let (tx, mut rx) = mpsc::channel(CONVERSATION_QUEUE);
    handlers.spawn(async move {
        while let Some(message) = rx.recv().await {
            dispatcher.handle_inbound(message).await;
        }
    });
    tx
}

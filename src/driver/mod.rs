//! Execution collaborator abstraction.
//!
//! The [`Executor`] trait decouples the task lifecycle from whatever
//! actually performs the work (a host CLI, a remote runner, a test double).
//! Progress flows back through a per-execution channel so concurrent
//! executions never share a subscription.

pub mod cli_executor;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::execution::{ExecResult, ExecTask, ProgressEvent};
use crate::Result;

pub use cli_executor::CliExecutor;

/// Something that can run a task to completion.
pub trait Executor: Send + Sync {
    /// Run `task`, emitting progress on `progress` until it finishes.
    ///
    /// Implementations stop early when `cancel` fires. The progress sender
    /// is dropped when execution ends, which closes the subscription.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Executor`](crate::AppError::Executor) if the run
    /// cannot start, is cancelled, or times out.
    fn execute(
        &self,
        task: ExecTask,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<ExecResult>> + Send + '_>>;

    /// Best-effort request to stop a running task.
    ///
    /// Unknown task IDs are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Executor`](crate::AppError::Executor) if the
    /// request cannot be delivered.
    fn cancel(&self, task_id: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

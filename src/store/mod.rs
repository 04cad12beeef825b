//! Optional execution history persistence.
//!
//! Components hold an `Option<Arc<dyn HistoryStore>>`; when it is absent,
//! read-only features answer with an "unavailable" notice instead of failing.

pub mod memory;

use std::future::Future;
use std::pin::Pin;

use crate::models::execution::ExecutionRecord;
use crate::Result;

pub use memory::MemoryHistoryStore;

/// Persistence for finished executions.
pub trait HistoryStore: Send + Sync {
    /// Append a finished execution.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`](crate::AppError::Store) on write failure.
    fn record_execution(
        &self,
        record: ExecutionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Most recent executions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`](crate::AppError::Store) on read failure.
    fn recent_executions(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExecutionRecord>>> + Send + '_>>;
}

//! Bounded in-memory [`HistoryStore`].

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::Mutex;

use super::HistoryStore;
use crate::models::execution::ExecutionRecord;
use crate::Result;

/// Default number of retained records.
pub const DEFAULT_CAPACITY: usize = 200;

/// Ring buffer of recent executions.
#[derive(Debug)]
pub struct MemoryHistoryStore {
    records: Mutex<VecDeque<ExecutionRecord>>,
    capacity: usize,
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MemoryHistoryStore {
    /// Keep at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn record_execution(
        &self,
        record: ExecutionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            records.push_front(record);
            records.truncate(self.capacity);
            Ok(())
        })
    }

    fn recent_executions(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExecutionRecord>>> + Send + '_>> {
        Box::pin(async move {
            let records = self.records.lock().await;
            Ok(records.iter().take(limit).cloned().collect())
        })
    }
}

//! Task orchestration.
//!
//! Covers the per-conversation task lifecycle, progress throttling, and
//! backlog task resolution.

pub mod backlog;
pub mod progress;
pub mod task_manager;

pub use task_manager::{
    spawn_expiry_task, CancelOutcome, ConfirmOutcome, ManagerSettings, TaskLifecycleManager,
};

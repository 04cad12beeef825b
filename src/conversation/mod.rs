//! Bounded per-conversation message history.

pub mod store;

pub use store::{spawn_sweep_task, ConversationStore, SWEEP_INTERVAL};

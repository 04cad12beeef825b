#![forbid(unsafe_code)]

//! Orchestration layer for a chat-driven coding assistant.
//!
//! Inbound operator messages are admitted by a per-identity rate limiter,
//! classified into intents, and routed either to read-only analysis runs
//! or to a per-conversation task lifecycle (propose, confirm, execute,
//! report).

pub mod admission;
pub mod classifier;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod driver;
pub mod errors;
pub mod identity;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod service;
pub mod store;
pub mod transport;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};

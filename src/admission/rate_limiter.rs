//! Per-identity token buckets.
//!
//! Every identity owns two independent buckets: one for inbound messages
//! (refilled per minute) and one for task submissions (refilled per hour).
//! Buckets start full and are created lazily on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RateLimitConfig;

/// How often idle buckets are swept.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

/// Idle age after which a bucket is dropped.
pub const BUCKET_MAX_AGE: Duration = Duration::from_secs(3600);

/// Token bucket with fractional refill.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    #[must_use]
    pub fn new(capacity: u32, refill_per_second: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity);
        Self {
            tokens: capacity,
            capacity,
            refill_per_second,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }

    /// Refill for elapsed time, then take one token if available.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens available at `now`, without consuming.
    #[must_use]
    pub fn available(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        // Bounded by capacity, which came from a u32.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = tokens.max(0.0).floor() as u32;
        whole
    }

    /// Time of the most recent refill.
    #[must_use]
    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }
}

#[derive(Debug, Default)]
struct Buckets {
    messages: HashMap<String, TokenBucket>,
    tasks: HashMap<String, TokenBucket>,
}

/// Thread-safe admission controller shared by the dispatcher and the task manager.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    message_capacity: u32,
    message_rate: f64,
    task_capacity: u32,
    task_rate: f64,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    /// Build a limiter from configuration.
    ///
    /// Bucket capacity is the smaller of the burst size and the per-period
    /// rate, so a tiny hourly task budget is never exceeded by the burst.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            message_capacity: config.burst_size.min(config.messages_per_minute),
            message_rate: f64::from(config.messages_per_minute) / 60.0,
            task_capacity: config.burst_size.min(config.tasks_per_hour),
            task_rate: f64::from(config.tasks_per_hour) / 3600.0,
            buckets: Mutex::new(Buckets::default()),
        }
    }

    /// Whether limits are enforced.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Consume one message token for `id`.
    pub fn allow_message(&self, id: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut guard = self.lock();
        let bucket = guard
            .messages
            .entry(id.to_owned())
            .or_insert_with(|| TokenBucket::new(self.message_capacity, self.message_rate, now));
        let allowed = bucket.try_consume(now);
        if !allowed {
            debug!(identity = id, "message rate limit exceeded");
        }
        allowed
    }

    /// Consume one task token for `id`.
    pub fn allow_task(&self, id: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut guard = self.lock();
        let bucket = guard
            .tasks
            .entry(id.to_owned())
            .or_insert_with(|| TokenBucket::new(self.task_capacity, self.task_rate, now));
        let allowed = bucket.try_consume(now);
        if !allowed {
            debug!(identity = id, "task rate limit exceeded");
        }
        allowed
    }

    /// Message tokens currently available; `None` when limiting is disabled.
    #[must_use]
    pub fn remaining_messages(&self, id: &str) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        let guard = self.lock();
        Some(
            guard
                .messages
                .get(id)
                .map_or(self.message_capacity, |b| b.available(Instant::now())),
        )
    }

    /// Task tokens currently available; `None` when limiting is disabled.
    #[must_use]
    pub fn remaining_tasks(&self, id: &str) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        let guard = self.lock();
        Some(
            guard
                .tasks
                .get(id)
                .map_or(self.task_capacity, |b| b.available(Instant::now())),
        )
    }

    /// Drop buckets whose last refill is older than `max_age`.
    ///
    /// Returns the number of buckets removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut guard = self.lock();
        let before = guard.messages.len() + guard.tasks.len();
        let fresh = |b: &TokenBucket| now.saturating_duration_since(b.last_refill()) <= max_age;
        guard.messages.retain(|_, b| fresh(b));
        guard.tasks.retain(|_, b| fresh(b));
        before - (guard.messages.len() + guard.tasks.len())
    }

    /// Number of identities with at least one live bucket.
    #[must_use]
    pub fn tracked_identities(&self) -> usize {
        let guard = self.lock();
        let mut ids: Vec<&String> = guard.messages.keys().chain(guard.tasks.keys()).collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawn the idle-bucket cleanup background task.
#[must_use]
pub fn spawn_cleanup_task(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("rate limiter cleanup shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = limiter.cleanup(max_age);
                    if removed > 0 {
                        debug!(removed, "dropped idle rate limit buckets");
                    }
                }
            }
        }
    })
}

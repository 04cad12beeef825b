//! Admission control for inbound messages and task submissions.

pub mod rate_limiter;

pub use rate_limiter::{
    spawn_cleanup_task, RateLimiter, TokenBucket, BUCKET_MAX_AGE, CLEANUP_INTERVAL,
};

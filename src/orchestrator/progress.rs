//! Progress update throttling.
//!
//! An update is forwarded when its phase differs from the last forwarded
//! one, when percent advanced by at least [`MIN_PERCENT_DELTA`], or when
//! [`MIN_INTERVAL`] passed since the last forward. State lives for a
//! single execution.

use std::time::{Duration, Instant};

/// Percent advance that forces a forward.
pub const MIN_PERCENT_DELTA: u8 = 15;

/// Elapsed time that forces a forward.
pub const MIN_INTERVAL: Duration = Duration::from_secs(3);

/// Per-execution throttle state.
#[derive(Debug, Clone, Default)]
pub struct ProgressThrottle {
    last: Option<Forwarded>,
}

#[derive(Debug, Clone)]
struct Forwarded {
    phase: String,
    percent: u8,
    at: Instant,
}

impl ProgressThrottle {
    /// Fresh throttle; the first update always passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether to forward `(phase, percent)` observed at `now`,
    /// recording it as the last forward when it passes.
    pub fn should_forward(&mut self, phase: &str, percent: u8, now: Instant) -> bool {
        let pass = match &self.last {
            None => true,
            Some(last) => {
                last.phase != phase
                    || percent.saturating_sub(last.percent) >= MIN_PERCENT_DELTA
                    || now.saturating_duration_since(last.at) >= MIN_INTERVAL
            }
        };
        if pass {
            self.last = Some(Forwarded {
                phase: phase.to_owned(),
                percent,
                at: now,
            });
        }
        pass
    }
}

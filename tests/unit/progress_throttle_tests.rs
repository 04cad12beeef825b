//! Unit tests for progress update throttling.

use std::time::{Duration, Instant};

use pilot_orchestrator::orchestrator::progress::ProgressThrottle;

/// Small increments within one phase are dropped until the delta is large enough.
#[test]
fn small_increments_are_dropped() {
    let start = Instant::now();
    let mut throttle = ProgressThrottle::new();

    assert!(throttle.should_forward("Implementing", 10, start));
    assert!(!throttle.should_forward("Implementing", 12, start));
    assert!(throttle.should_forward("Implementing", 30, start));
}

/// The delta is measured from the last forwarded update, not the last seen one.
#[test]
fn delta_is_measured_from_last_forward() {
    let start = Instant::now();
    let mut throttle = ProgressThrottle::new();

    assert!(throttle.should_forward("Testing", 10, start));
    assert!(!throttle.should_forward("Testing", 20, start));
    assert!(throttle.should_forward("Testing", 25, start));
}

#[test]
fn phase_change_always_forwards() {
    let start = Instant::now();
    let mut throttle = ProgressThrottle::new();

    assert!(throttle.should_forward("Implementing", 40, start));
    assert!(throttle.should_forward("Testing", 41, start));
}

#[test]
fn elapsed_interval_forwards() {
    let start = Instant::now();
    let mut throttle = ProgressThrottle::new();

    assert!(throttle.should_forward("Running", 10, start));
    assert!(!throttle.should_forward("Running", 11, start + Duration::from_secs(1)));
    assert!(throttle.should_forward("Running", 11, start + Duration::from_secs(3)));
}

/// Percent going backwards within a phase is not an advance.
#[test]
fn regression_within_phase_is_dropped() {
    let start = Instant::now();
    let mut throttle = ProgressThrottle::new();

    assert!(throttle.should_forward("Running", 50, start));
    assert!(!throttle.should_forward("Running", 10, start));
}

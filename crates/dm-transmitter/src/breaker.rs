// SPDX-License-Identifier: MIT OR Apache-2.0
//! Instance-bound circuit breaker.
//!
//! The breaker's state lives on the owning client instance, never in any
//! process-global registry. After `failure_threshold` consecutive
//! transient failures the circuit opens and calls fail fast without
//! touching the network; once `reset_timeout` elapses a single probe is
//! allowed through, and its outcome decides whether the circuit closes
//! again.

use dm_error::{ErrorCode, MeshError};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probing: bool,
}

/// A counting circuit breaker for one egress client.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Breaker that opens after `failure_threshold` consecutive failures
    /// and allows one probe after `reset_timeout`.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .expect("breaker lock poisoned")
            .opened_at
            .is_some()
    }

    /// Gate a call. `Err(CIRCUIT_OPEN)` means the call must not be made.
    /// While open and past the reset timeout, exactly one caller is
    /// admitted as the probe.
    pub fn try_acquire(&self) -> Result<(), MeshError> {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match state.opened_at {
            None => Ok(()),
            Some(opened_at) => {
                if opened_at.elapsed() < self.reset_timeout {
                    return Err(MeshError::new(ErrorCode::CircuitOpen, "circuit breaker open"));
                }
                if state.probing {
                    return Err(MeshError::new(
                        ErrorCode::CircuitOpen,
                        "circuit breaker probing",
                    ));
                }
                state.probing = true;
                info!("circuit breaker half-open, admitting probe");
                Ok(())
            }
        }
    }

    /// Record a successful call: the circuit closes.
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        if state.opened_at.is_some() {
            info!("circuit breaker closed");
        }
        *state = BreakerState::default();
    }

    /// Record a transient failure. Opens (or re-opens) the circuit once
    /// the threshold is reached.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.consecutive_failures += 1;
        state.probing = false;
        if state.consecutive_failures >= self.failure_threshold {
            if state.opened_at.is_none() {
                warn!(
                    failures = state.consecutive_failures,
                    "circuit breaker opened"
                );
            }
            state.opened_at = Some(Instant::now());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_breaker_admits_calls() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(breaker.try_acquire().is_ok());
        assert!(!breaker.is_open());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.try_acquire().is_ok());
        breaker.record_failure();
        assert!(breaker.is_open());
        let err = breaker.try_acquire().unwrap_err();
        assert_eq!(err.code, ErrorCode::CircuitOpen);
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[test]
    fn single_probe_after_reset_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        assert!(breaker.try_acquire().is_err());

        std::thread::sleep(Duration::from_millis(30));
        // Exactly one probe is admitted.
        assert!(breaker.try_acquire().is_ok());
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.try_acquire().is_ok());
        breaker.record_failure();
        // Back to fully open with a fresh window.
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn successful_probe_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.try_acquire().is_ok());
        breaker.record_success();
        assert!(!breaker.is_open());
        assert!(breaker.try_acquire().is_ok());
    }
}

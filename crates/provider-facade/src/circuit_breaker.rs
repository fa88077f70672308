//! Per-provider circuit breaker, adapted from the teacher's instance-health
//! circuit breaker: same Closed/Open/HalfOpen state machine and atomics,
//! keyed by [`ProviderId`] instead of an instance id.

use crate::ProviderId;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub half_open_max_requests: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            half_open_max_requests: 3,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

pub struct CircuitBreaker {
    provider_id: ProviderId,
    state: RwLock<CircuitState>,
    config: CircuitBreakerConfig,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    half_open_requests: AtomicU32,
    opened_at_millis: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(provider_id: ProviderId, config: CircuitBreakerConfig) -> Self {
        Self {
            provider_id,
            state: RwLock::new(CircuitState::Closed),
            config,
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            half_open_requests: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.check_timeout();
        *self.state.read().unwrap()
    }

    pub fn allow_request(&self) -> bool {
        self.check_timeout();
        let state = *self.state.read().unwrap();
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let current = self.half_open_requests.fetch_add(1, Ordering::SeqCst);
                current < self.config.half_open_max_requests
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed => self.failure_count.store(0, Ordering::SeqCst),
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    info!(provider = ?self.provider_id, successes, "circuit closing after recovery");
                    self.transition_to(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                debug!(provider = ?self.provider_id, "success recorded while circuit open");
            }
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    warn!(provider = ?self.provider_id, failures, "circuit opening");
                    self.transition_to(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(provider = ?self.provider_id, "circuit re-opening after half-open failure");
                self.transition_to(&mut state, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn check_timeout(&self) {
        let state = *self.state.read().unwrap();
        if state != CircuitState::Open {
            return;
        }
        let opened_at = self.opened_at_millis.load(Ordering::SeqCst);
        if opened_at == 0 {
            return;
        }
        let elapsed_ms = (chrono::Utc::now().timestamp_millis() as u64).saturating_sub(opened_at);
        if Duration::from_millis(elapsed_ms) >= self.config.reset_timeout {
            let mut state = self.state.write().unwrap();
            if *state == CircuitState::Open {
                info!(provider = ?self.provider_id, "circuit half-opening for trial requests");
                self.transition_to(&mut state, CircuitState::HalfOpen);
            }
        }
    }

    fn transition_to(&self, state: &mut CircuitState, new_state: CircuitState) {
        *state = new_state;
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        self.half_open_requests.store(0, Ordering::SeqCst);
        if new_state == CircuitState::Open {
            self.opened_at_millis
                .store(chrono::Utc::now().timestamp_millis() as u64, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_failure_threshold_and_blocks_requests() {
        let breaker = CircuitBreaker::new(
            ProviderId::Claude,
            CircuitBreakerConfig {
                failure_threshold: 3,
                ..Default::default()
            },
        );
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new(
            ProviderId::Claude,
            CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 2,
                reset_timeout: Duration::from_millis(0),
                ..Default::default()
            },
        );
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

//! # Circuit Breaker State Machine
//!
//! Per-service breaker record and its transition rules. The record is a plain
//! value; `CircuitBreakerRegistry` owns the records, serializes access to each
//! one and publishes the events produced here.
//!
//! ## States
//!
//! ```text
//!            failure_count >= failure_threshold
//!   Closed ─────────────────────────────────────▶ Open
//!     ▲                                           │  ▲
//!     │ success_count >= success_threshold        │  │ any failure
//!     │                                now >= next_retry_at
//!     │                                           ▼  │
//!     └────────────────────────────────────── HalfOpen
//! ```
//!
//! The Open to HalfOpen edge is pull-based: it is applied by [`CircuitBreakerRecord::refresh`]
//! when the record is read, never by a timer.

use crate::resilience::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls are allowed through
    Closed,
    /// Failure mode - calls should fail fast until the timeout elapses
    Open,
    /// Testing recovery - probe calls decide whether to close or reopen
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change produced by a record operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

/// Breaker state for one downstream service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerRecord {
    pub service_name: String,
    pub state: CircuitState,
    /// Consecutive failures; reset on entering Closed or HalfOpen
    pub failure_count: u32,
    /// Successful probes; only meaningful while HalfOpen
    pub success_count: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_state_change_at: DateTime<Utc>,
    /// Set if and only if the state is Open
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub config: CircuitBreakerConfig,
}

impl CircuitBreakerRecord {
    pub fn new(service_name: impl Into<String>, config: CircuitBreakerConfig, now: DateTime<Utc>) -> Self {
        Self {
            service_name: service_name.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            last_failure_at: None,
            last_success_at: None,
            last_state_change_at: now,
            next_retry_at: None,
            created_at: now,
            config,
        }
    }

    /// Whether callers should send traffic to the service
    pub fn is_available(&self) -> bool {
        self.state != CircuitState::Open
    }

    /// Count a failed call and open the circuit if the rules say so
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        self.failure_count = self.failure_count.saturating_add(1);
        self.failed_requests += 1;
        self.total_requests += 1;
        self.last_failure_at = Some(now);

        match self.state {
            CircuitState::Closed if self.failure_count >= self.config.failure_threshold => {
                Some(self.transition_to(CircuitState::Open, now))
            }
            CircuitState::HalfOpen => Some(self.transition_to(CircuitState::Open, now)),
            _ => None,
        }
    }

    /// Count a successful call and close the circuit once enough probes pass
    pub fn record_success(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        self.successful_requests += 1;
        self.total_requests += 1;
        self.last_success_at = Some(now);

        match self.state {
            CircuitState::HalfOpen => {
                self.success_count = self.success_count.saturating_add(1);
                if self.success_count >= self.config.success_threshold {
                    Some(self.transition_to(CircuitState::Closed, now))
                } else {
                    None
                }
            }
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            }
            CircuitState::Open => None,
        }
    }

    /// Apply the lazy Open to HalfOpen edge if the retry time has passed
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        match (self.state, self.next_retry_at) {
            (CircuitState::Open, Some(retry_at)) if now >= retry_at => {
                Some(self.transition_to(CircuitState::HalfOpen, now))
            }
            _ => None,
        }
    }

    /// Force the record into `to`, applying the entry rules of the target state
    pub fn transition_to(&mut self, to: CircuitState, now: DateTime<Utc>) -> Transition {
        let from = self.state;
        self.state = to;
        self.last_state_change_at = now;

        match to {
            CircuitState::Open => {
                self.success_count = 0;
                self.next_retry_at = Some(now + self.config.timeout());
            }
            CircuitState::HalfOpen | CircuitState::Closed => {
                self.failure_count = 0;
                self.success_count = 0;
                self.next_retry_at = None;
            }
        }

        Transition { from, to, at: now }
    }

    /// Milliseconds until a half-open probe is allowed, if the circuit is open
    pub fn time_until_retry_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.next_retry_at
            .map(|retry_at| (retry_at - now).num_milliseconds().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(failure_threshold: u32, success_threshold: u32) -> CircuitBreakerRecord {
        let config = CircuitBreakerConfig {
            failure_threshold,
            success_threshold,
            timeout_ms: 1_000,
            ..Default::default()
        };
        CircuitBreakerRecord::new("payments", config, Utc::now())
    }

    #[test]
    fn test_opens_at_failure_threshold() {
        let mut cb = record(3, 2);
        let now = Utc::now();

        assert!(cb.record_failure(now).is_none());
        assert!(cb.record_failure(now).is_none());
        let transition = cb.record_failure(now).expect("should open");

        assert_eq!(transition.from, CircuitState::Closed);
        assert_eq!(transition.to, CircuitState::Open);
        assert_eq!(cb.next_retry_at, Some(now + Duration::milliseconds(1_000)));
        assert_eq!(cb.failure_count, 3);
        assert!(!cb.is_available());
    }

    #[test]
    fn test_success_in_closed_resets_failures() {
        let mut cb = record(3, 2);
        let now = Utc::now();
        cb.record_failure(now);
        cb.record_failure(now);
        cb.record_success(now);

        assert_eq!(cb.failure_count, 0);
        assert_eq!(cb.success_count, 0);
        assert_eq!(cb.total_requests, 3);
    }

    #[test]
    fn test_refresh_only_after_retry_time() {
        let mut cb = record(1, 1);
        let now = Utc::now();
        cb.record_failure(now);

        assert!(cb.refresh(now + Duration::milliseconds(999)).is_none());
        assert_eq!(cb.state, CircuitState::Open);

        let transition = cb.refresh(now + Duration::milliseconds(1_000)).expect("half open");
        assert_eq!(transition.to, CircuitState::HalfOpen);
        assert_eq!(cb.failure_count, 0);
        assert!(cb.next_retry_at.is_none());

        // A second read does not transition again
        assert!(cb.refresh(now + Duration::milliseconds(2_000)).is_none());
    }

    #[test]
    fn test_half_open_single_failure_reopens() {
        let mut cb = record(5, 3);
        let now = Utc::now();
        cb.transition_to(CircuitState::HalfOpen, now);
        cb.record_success(now);
        cb.record_success(now);
        assert_eq!(cb.success_count, 2);

        let transition = cb.record_failure(now).expect("reopen");
        assert_eq!(transition.to, CircuitState::Open);
        assert_eq!(cb.success_count, 0);
        assert!(cb.next_retry_at.is_some());
    }

    #[test]
    fn test_half_open_closes_at_success_threshold() {
        let mut cb = record(5, 2);
        let now = Utc::now();
        cb.transition_to(CircuitState::HalfOpen, now);

        assert!(cb.record_success(now).is_none());
        let transition = cb.record_success(now).expect("close");
        assert_eq!(transition.to, CircuitState::Closed);
        assert_eq!(cb.success_count, 0);
        assert_eq!(cb.failure_count, 0);
    }

    #[test]
    fn test_time_until_retry() {
        let mut cb = record(1, 1);
        let now = Utc::now();
        assert_eq!(cb.time_until_retry_ms(now), None);

        cb.record_failure(now);
        assert_eq!(cb.time_until_retry_ms(now + Duration::milliseconds(400)), Some(600));
        assert_eq!(cb.time_until_retry_ms(now + Duration::milliseconds(5_000)), Some(0));
    }
}

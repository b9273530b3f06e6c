//! # Circuit Breaker Metrics
//!
//! Point-in-time snapshots of breaker counters, and a system-wide aggregate
//! used for health reporting.

use crate::resilience::{CircuitBreakerRecord, CircuitState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metrics for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerMetrics {
    pub service_name: String,

    pub state: CircuitState,

    /// Current consecutive failure count
    pub failure_count: u32,

    /// Successful probes in the current half-open window
    pub success_count: u32,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,

    /// `failed_requests / total_requests`, 0.0 when nothing was recorded
    pub failure_rate: f64,

    /// `successful_requests / total_requests`, 0.0 when nothing was recorded
    pub success_rate: f64,

    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,

    /// When the breaker last changed state
    pub transitioned_at: DateTime<Utc>,

    pub next_retry_at: Option<DateTime<Utc>>,

    /// Remaining open time, if the circuit is open
    pub time_until_retry_ms: Option<i64>,
}

impl CircuitBreakerMetrics {
    /// Snapshot a record as of `now`
    pub fn from_record(record: &CircuitBreakerRecord, now: DateTime<Utc>) -> Self {
        let (failure_rate, success_rate) = if record.total_requests > 0 {
            let total = record.total_requests as f64;
            (
                record.failed_requests as f64 / total,
                record.successful_requests as f64 / total,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            service_name: record.service_name.clone(),
            state: record.state,
            failure_count: record.failure_count,
            success_count: record.success_count,
            total_requests: record.total_requests,
            successful_requests: record.successful_requests,
            failed_requests: record.failed_requests,
            failure_rate,
            success_rate,
            last_failure_at: record.last_failure_at,
            last_success_at: record.last_success_at,
            transitioned_at: record.last_state_change_at,
            next_retry_at: record.next_retry_at,
            time_until_retry_ms: record.time_until_retry_ms(now),
        }
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting calls",
            CircuitState::HalfOpen => "Recovering - Testing service health",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "{}: {} | Requests: {} | Success: {:.1}% | Failures: {}",
            self.service_name,
            self.state_description(),
            self.total_requests,
            self.success_rate * 100.0,
            self.failed_requests
        )
    }
}

/// System-wide circuit breaker metrics aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    /// Metrics for individual circuit breakers by service name
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,

    pub collected_at: DateTime<Utc>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new(collected_at: DateTime<Utc>) -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at,
        }
    }

    pub fn add_circuit_breaker(&mut self, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers
            .insert(metrics.service_name.clone(), metrics);
    }

    /// Get count of circuit breakers by state
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for metrics in self.circuit_breakers.values() {
            *counts.entry(metrics.state).or_insert(0) += 1;
        }
        counts
    }

    /// Unhealthy circuit breakers, sorted by service name
    pub fn unhealthy_circuits(&self) -> Vec<&CircuitBreakerMetrics> {
        let mut unhealthy: Vec<_> = self
            .circuit_breakers
            .values()
            .filter(|metrics| !metrics.is_healthy())
            .collect();
        unhealthy.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        unhealthy
    }

    /// Calculate system-wide health score (0.0 to 1.0)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let healthy_count = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();

        healthy_count as f64 / self.circuit_breakers.len() as f64
    }

    pub fn total_requests(&self) -> u64 {
        self.circuit_breakers
            .values()
            .map(|metrics| metrics.total_requests)
            .sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.circuit_breakers
            .values()
            .map(|metrics| metrics.failed_requests)
            .sum()
    }

    pub fn system_failure_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.total_failures() as f64 / total as f64
    }

    /// Format summary for logging
    pub fn format_summary(&self) -> String {
        let state_counts = self.count_by_state();
        let count = |state| state_counts.get(&state).copied().unwrap_or(0);

        format!(
            "Circuit Breakers: {} total | {} closed | {} open | {} half-open | Health: {:.1}% | System failure rate: {:.2}%",
            self.circuit_breakers.len(),
            count(CircuitState::Closed),
            count(CircuitState::Open),
            count(CircuitState::HalfOpen),
            self.health_score() * 100.0,
            self.system_failure_rate() * 100.0
        )
    }
}

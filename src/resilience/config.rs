//! # Circuit Breaker Configuration
//!
//! Per-service thresholds for the breaker state machine, plus the partial
//! update type used by `CircuitBreakerRegistry::update_config`.

use serde::{Deserialize, Serialize};

/// Bounds accepted for each configuration field (inclusive)
pub const FAILURE_THRESHOLD_RANGE: (u32, u32) = (1, 100);
pub const SUCCESS_THRESHOLD_RANGE: (u32, u32) = (1, 10);
pub const TIMEOUT_MS_RANGE: (u64, u64) = (1_000, 600_000);
pub const MONITORING_WINDOW_MS_RANGE: (u64, u64) = (60_000, 3_600_000);

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Number of successful calls in half-open state to close the circuit
    pub success_threshold: u32,

    /// Time to wait in open state before allowing a half-open probe
    pub timeout_ms: u64,

    /// Observation window for failure-rate policies.
    ///
    /// Validated and stored; no transition rule reads it yet.
    pub monitoring_window_ms: u64,
}

impl CircuitBreakerConfig {
    /// Create configuration for external API calls
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 45_000,
            ..Default::default()
        }
    }

    /// Create configuration for queue operations
    pub fn for_queue() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            timeout_ms: 15_000,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.timeout_ms).unwrap_or(i64::MAX))
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        check_range(
            "failure_threshold",
            u64::from(self.failure_threshold),
            widen(FAILURE_THRESHOLD_RANGE),
        )?;
        check_range(
            "success_threshold",
            u64::from(self.success_threshold),
            widen(SUCCESS_THRESHOLD_RANGE),
        )?;
        check_range("timeout_ms", self.timeout_ms, TIMEOUT_MS_RANGE)?;
        check_range(
            "monitoring_window_ms",
            self.monitoring_window_ms,
            MONITORING_WINDOW_MS_RANGE,
        )?;
        Ok(())
    }

    /// Return a copy with every field present in `update` overridden
    #[must_use]
    pub fn merged(&self, update: &CircuitBreakerConfigUpdate) -> Self {
        Self {
            failure_threshold: update.failure_threshold.unwrap_or(self.failure_threshold),
            success_threshold: update.success_threshold.unwrap_or(self.success_threshold),
            timeout_ms: update.timeout_ms.unwrap_or(self.timeout_ms),
            monitoring_window_ms: update
                .monitoring_window_ms
                .unwrap_or(self.monitoring_window_ms),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 60_000,
            monitoring_window_ms: 300_000,
        }
    }
}

/// Partial configuration; absent fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfigUpdate {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub monitoring_window_ms: Option<u64>,
}

impl CircuitBreakerConfigUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn widen((min, max): (u32, u32)) -> (u64, u64) {
    (u64::from(min), u64::from(max))
}

fn check_range(field: &str, value: u64, (min, max): (u64, u64)) -> Result<(), String> {
    if value == 0 {
        return Err(format!("{field} must be greater than 0"));
    }
    if value < min || value > max {
        return Err(format!("{field} must be between {min} and {max}, got {value}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        let invalid = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        let err = invalid.validate().unwrap_err();
        assert!(err.contains("failure_threshold must be greater than 0"));

        let invalid = CircuitBreakerConfig {
            success_threshold: 11,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = CircuitBreakerConfig {
            timeout_ms: 999,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = CircuitBreakerConfig {
            monitoring_window_ms: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_preset_configurations() {
        let api = CircuitBreakerConfig::for_external_api();
        assert_eq!(api.failure_threshold, 5);
        assert!(api.validate().is_ok());

        let queue = CircuitBreakerConfig::for_queue();
        assert_eq!(queue.failure_threshold, 3);
        assert!(queue.validate().is_ok());
    }

    #[test]
    fn test_merge_only_overrides_present_fields() {
        let base = CircuitBreakerConfig::default();
        let update = CircuitBreakerConfigUpdate {
            failure_threshold: Some(10),
            ..Default::default()
        };
        let merged = base.merged(&update);

        assert_eq!(merged.failure_threshold, 10);
        assert_eq!(merged.success_threshold, base.success_threshold);
        assert_eq!(merged.timeout_ms, base.timeout_ms);
        assert!(CircuitBreakerConfigUpdate::default().is_empty());
        assert!(!update.is_empty());
    }
}

//! # Circuit Breaker Registry
//!
//! Tracks one [`CircuitBreakerRecord`] per downstream service, gates
//! availability, and publishes typed events for every recorded outcome and
//! state change.
//!
//! ## Concurrency
//!
//! Records live in a `DashMap`. Every operation holds the entry lock of the
//! service it touches for the whole read-modify-write, including the lazy
//! Open to HalfOpen check, so concurrent readers flip a breaker exactly once.
//! Events are published under the same lock and therefore arrive in the order
//! the mutations happened.

use crate::batch::{validate_batch_ids, BatchItemResult, BatchOperation, BatchResponse};
use crate::clock::{Clock, SystemClock};
use crate::error::{RecoveryError, RecoveryResult, ResourceKind};
use crate::metrics::circuit_breaker_transitions_total;
use crate::resilience::events::{EventBus, DEFAULT_EVENT_CAPACITY};
use crate::resilience::{
    CircuitBreakerConfig, CircuitBreakerConfigUpdate, CircuitBreakerEvent, CircuitBreakerMetrics,
    CircuitBreakerRecord, CircuitEventKind, CircuitEventSubscription, CircuitState,
    SystemCircuitBreakerMetrics, Transition,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use opentelemetry::KeyValue;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry of per-service circuit breakers
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, CircuitBreakerRecord>,
    default_config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.breakers.len())
            .field("default_config", &self.default_config)
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(
            CircuitBreakerConfig::default(),
            Arc::new(SystemClock),
            DEFAULT_EVENT_CAPACITY,
        )
    }
}

impl CircuitBreakerRegistry {
    pub fn new(
        default_config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        event_capacity: usize,
    ) -> Self {
        info!(
            failure_threshold = default_config.failure_threshold,
            success_threshold = default_config.success_threshold,
            timeout_ms = default_config.timeout_ms,
            "Circuit breaker registry initialized"
        );

        Self {
            breakers: DashMap::new(),
            default_config,
            clock,
            events: EventBus::new(event_capacity),
        }
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Number of tracked services
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    pub fn contains(&self, service_name: &str) -> bool {
        self.breakers.contains_key(service_name)
    }

    /// Explicitly create a breaker. Fails if the service is already tracked.
    pub fn initialize(
        &self,
        service_name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> RecoveryResult<CircuitBreakerRecord> {
        let config = config.unwrap_or(self.default_config);
        config.validate().map_err(RecoveryError::Validation)?;

        match self.breakers.entry(service_name.to_string()) {
            Entry::Occupied(_) => Err(RecoveryError::AlreadyExists {
                resource: ResourceKind::CircuitBreaker,
                id: service_name.to_string(),
            }),
            Entry::Vacant(vacant) => {
                let now = self.clock.now();
                let record = vacant
                    .insert(CircuitBreakerRecord::new(service_name, config, now))
                    .clone();

                info!(
                    service = %service_name,
                    failure_threshold = config.failure_threshold,
                    success_threshold = config.success_threshold,
                    timeout_ms = config.timeout_ms,
                    "Circuit breaker initialized"
                );
                self.publish(
                    service_name,
                    CircuitEventKind::Closed,
                    now,
                    json!({ "initialized": true }),
                );
                Ok(record)
            }
        }
    }

    /// Record a failed call. Creates the breaker with default config if absent.
    pub fn record_failure(&self, service_name: &str, error: Option<&str>) -> CircuitBreakerRecord {
        let now = self.clock.now();
        let mut record = self.entry_or_default(service_name, now);
        let transition = record.record_failure(now);

        debug!(
            service = %service_name,
            failure_count = record.failure_count,
            state = %record.state,
            error = error.unwrap_or_default(),
            "Circuit breaker recorded failure"
        );

        self.publish(
            service_name,
            CircuitEventKind::Failure,
            now,
            json!({ "error": error }),
        );
        if let Some(transition) = transition {
            self.publish_transition(&record, transition);
        }
        record.clone()
    }

    /// Record a successful call. Creates the breaker with default config if absent.
    pub fn record_success(&self, service_name: &str) -> CircuitBreakerRecord {
        let now = self.clock.now();
        let mut record = self.entry_or_default(service_name, now);
        let transition = record.record_success(now);

        self.publish(service_name, CircuitEventKind::Success, now, Value::Null);
        if let Some(transition) = transition {
            self.publish_transition(&record, transition);
        }
        record.clone()
    }

    /// Current state, after applying any due Open to HalfOpen transition
    pub fn get_state(&self, service_name: &str) -> RecoveryResult<CircuitBreakerRecord> {
        let mut record = self
            .breakers
            .get_mut(service_name)
            .ok_or_else(|| RecoveryError::circuit_not_found(service_name))?;
        self.refresh(&mut record);
        Ok(record.clone())
    }

    /// Whether calls to the service should proceed.
    ///
    /// Untracked services have never reported a failure and are available.
    pub fn is_available(&self, service_name: &str) -> bool {
        match self.breakers.get_mut(service_name) {
            Some(mut record) => {
                self.refresh(&mut record);
                record.is_available()
            }
            None => true,
        }
    }

    /// All tracked breakers sorted by service name
    pub fn list_states(&self) -> Vec<CircuitBreakerRecord> {
        let mut states: Vec<_> = self
            .breakers
            .iter_mut()
            .map(|mut record| {
                self.refresh(&mut record);
                record.clone()
            })
            .collect();
        states.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        states
    }

    /// Force the breaker closed. Lifetime counters are kept.
    pub fn reset(&self, service_name: &str) -> RecoveryResult<CircuitBreakerRecord> {
        let mut record = self
            .breakers
            .get_mut(service_name)
            .ok_or_else(|| RecoveryError::circuit_not_found(service_name))?;

        warn!(service = %service_name, from_state = %record.state, "Circuit breaker forced closed");
        let transition = record.transition_to(CircuitState::Closed, self.clock.now());
        self.publish_transition(&record, transition);
        Ok(record.clone())
    }

    /// Reset each named breaker, reporting a per-service outcome
    pub fn batch_reset(&self, service_names: &[String]) -> RecoveryResult<BatchResponse> {
        validate_batch_ids(service_names)?;

        let results = service_names
            .iter()
            .map(|name| match self.reset(name) {
                Ok(_) => BatchItemResult::success(name, "Circuit breaker reset"),
                Err(e) => BatchItemResult::failed(name, &e),
            })
            .collect();

        Ok(BatchResponse::from_results(
            BatchOperation::CircuitBreakerReset,
            results,
            self.clock.now(),
        ))
    }

    /// Merge a partial config into the breaker's current config
    pub fn update_config(
        &self,
        service_name: &str,
        update: CircuitBreakerConfigUpdate,
    ) -> RecoveryResult<CircuitBreakerRecord> {
        let mut record = self
            .breakers
            .get_mut(service_name)
            .ok_or_else(|| RecoveryError::circuit_not_found(service_name))?;

        let merged = record.config.merged(&update);
        merged.validate().map_err(RecoveryError::Validation)?;
        record.config = merged;

        info!(
            service = %service_name,
            failure_threshold = merged.failure_threshold,
            success_threshold = merged.success_threshold,
            timeout_ms = merged.timeout_ms,
            "Circuit breaker configuration updated"
        );
        Ok(record.clone())
    }

    pub fn get_metrics(&self, service_name: &str) -> RecoveryResult<CircuitBreakerMetrics> {
        let mut record = self
            .breakers
            .get_mut(service_name)
            .ok_or_else(|| RecoveryError::circuit_not_found(service_name))?;
        self.refresh(&mut record);
        Ok(CircuitBreakerMetrics::from_record(&record, self.clock.now()))
    }

    /// Metrics for every tracked breaker plus system-wide aggregates
    pub fn get_all_metrics(&self) -> SystemCircuitBreakerMetrics {
        let now = self.clock.now();
        let mut system = SystemCircuitBreakerMetrics::new(now);
        for mut record in self.breakers.iter_mut() {
            self.refresh(&mut record);
            system.add_circuit_breaker(CircuitBreakerMetrics::from_record(&record, now));
        }
        system
    }

    /// Subscribe to every event the registry emits
    pub fn subscribe(&self) -> CircuitEventSubscription {
        self.events.subscribe(None)
    }

    /// Subscribe to a single event kind
    pub fn subscribe_to(&self, kind: CircuitEventKind) -> CircuitEventSubscription {
        self.events.subscribe(Some(kind))
    }

    fn entry_or_default(
        &self,
        service_name: &str,
        now: DateTime<Utc>,
    ) -> dashmap::mapref::one::RefMut<'_, String, CircuitBreakerRecord> {
        self.breakers
            .entry(service_name.to_string())
            .or_insert_with(|| {
                info!(service = %service_name, "Created circuit breaker with default config");
                CircuitBreakerRecord::new(service_name, self.default_config, now)
            })
    }

    fn refresh(&self, record: &mut CircuitBreakerRecord) {
        if let Some(transition) = record.refresh(self.clock.now()) {
            self.publish_transition(record, transition);
        }
    }

    fn publish_transition(&self, record: &CircuitBreakerRecord, transition: Transition) {
        let service = record.service_name.as_str();
        let (kind, details) = match transition.to {
            CircuitState::Open => {
                warn!(
                    service = %service,
                    from_state = %transition.from,
                    failure_count = record.failure_count,
                    next_retry_at = ?record.next_retry_at,
                    "Circuit breaker opened"
                );
                (
                    CircuitEventKind::Opened,
                    json!({
                        "failureCount": record.failure_count,
                        "nextRetryAt": record.next_retry_at,
                    }),
                )
            }
            CircuitState::HalfOpen => {
                info!(service = %service, "Circuit breaker half-open (testing recovery)");
                (CircuitEventKind::HalfOpen, json!({ "recoveryAttempt": true }))
            }
            CircuitState::Closed => {
                info!(service = %service, from_state = %transition.from, "Circuit breaker closed");
                (CircuitEventKind::Closed, json!({ "recovered": true }))
            }
        };

        circuit_breaker_transitions_total().add(
            1,
            &[
                KeyValue::new("service", service.to_string()),
                KeyValue::new("to_state", transition.to.as_str()),
            ],
        );
        self.publish(service, kind, transition.at, details);
    }

    fn publish(&self, service_name: &str, kind: CircuitEventKind, at: DateTime<Utc>, details: Value) {
        self.events.publish(CircuitBreakerEvent {
            service_name: service_name.to_string(),
            kind,
            timestamp: at,
            details,
        });
    }
}

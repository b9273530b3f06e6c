//! # Recovery Metrics
//!
//! OpenTelemetry instruments for the dead-letter queue, the DLQ processor and
//! circuit breaker transitions.
//!
//! Instruments resolve against the global meter provider, so they are no-ops
//! until the host application installs one (for example an OTLP exporter).
//!
//! ## Usage
//!
//! ```rust
//! use conductor_recovery::metrics::*;
//! use opentelemetry::KeyValue;
//!
//! dlq_entries_resolved_total().add(1, &[KeyValue::new("reason", "manual")]);
//! dlq_sweep_duration().record(12.5, &[]);
//! ```

use opentelemetry::metrics::{Counter, Histogram, Meter};
use std::sync::OnceLock;

static RECOVERY_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    RECOVERY_METER.get_or_init(|| opentelemetry::global::meter_provider().meter("conductor-recovery"))
}

// Counters

/// Entries added to the dead-letter queue
pub fn dlq_entries_added_total() -> Counter<u64> {
    meter()
        .u64_counter("conductor.dlq.entries_added.total")
        .with_description("Total number of tasks moved to the dead-letter queue")
        .build()
}

/// Entries marked resolved
///
/// Labels:
/// - reason: manual | batch | auto_retry_limit | auto_age
pub fn dlq_entries_resolved_total() -> Counter<u64> {
    meter()
        .u64_counter("conductor.dlq.entries_resolved.total")
        .with_description("Total number of dead-letter entries resolved")
        .build()
}

/// Resolved entries deleted by retention cleanup
pub fn dlq_entries_purged_total() -> Counter<u64> {
    meter()
        .u64_counter("conductor.dlq.entries_purged.total")
        .with_description("Total number of resolved dead-letter entries purged by retention")
        .build()
}

/// Notification attempts
///
/// Labels:
/// - kind: pending | archived | failed
/// - outcome: sent | failed | timeout
pub fn dlq_notifications_total() -> Counter<u64> {
    meter()
        .u64_counter("conductor.dlq.notifications.total")
        .with_description("Total number of DLQ notification attempts")
        .build()
}

/// Circuit breaker state transitions
///
/// Labels:
/// - service: downstream service name
/// - to_state: closed | open | half_open
pub fn circuit_breaker_transitions_total() -> Counter<u64> {
    meter()
        .u64_counter("conductor.circuit_breaker.transitions.total")
        .with_description("Total number of circuit breaker state transitions")
        .build()
}

// Histograms

/// Duration of one DLQ processor sweep in milliseconds
pub fn dlq_sweep_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("conductor.dlq.sweep.duration")
        .with_description("Duration of a DLQ processor sweep")
        .with_unit("ms")
        .build()
}

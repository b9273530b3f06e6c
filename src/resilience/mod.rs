//! # Resilience Module
//!
//! Per-service circuit breakers that isolate calls to unreliable downstream
//! services.
//!
//! ## Architecture
//!
//! - **State machine**: [`CircuitBreakerRecord`] holds counters and applies the
//!   Closed / Open / HalfOpen transition rules
//! - **Registry**: [`CircuitBreakerRegistry`] owns one record per service, gates
//!   availability and applies the time-based Open to HalfOpen edge lazily on read
//! - **Events**: every recorded outcome and state change is published as a
//!   [`CircuitBreakerEvent`] on a broadcast channel
//! - **Metrics**: [`CircuitBreakerMetrics`] snapshots and system-wide aggregates
//!
//! ## Usage
//!
//! ```rust
//! use conductor_recovery::resilience::{CircuitBreakerRegistry, CircuitState};
//!
//! let registry = CircuitBreakerRegistry::default();
//!
//! if registry.is_available("payments") {
//!     // call the service, then report the outcome
//!     registry.record_failure("payments", Some("connection refused"));
//! }
//!
//! assert_eq!(registry.get_state("payments").unwrap().state, CircuitState::Closed);
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod events;
pub mod metrics;
pub mod registry;

pub use circuit_breaker::{CircuitBreakerRecord, CircuitState, Transition};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigUpdate};
pub use events::{CircuitBreakerEvent, CircuitEventKind, CircuitEventSubscription};
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use registry::CircuitBreakerRegistry;

#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Conductor Recovery
//!
//! Failure-recovery core for the conductor task platform.
//!
//! ## Overview
//!
//! Three cooperating pieces keep failing work from taking the platform down
//! with it:
//!
//! - **Circuit breakers** ([`resilience`]): one Closed/Open/HalfOpen state
//!   machine per downstream service, with typed events and metrics
//! - **Dead-letter queue** ([`dlq`]): holding area for tasks that exhausted
//!   their retries, with resubmission, resolution, statistics and retention
//! - **DLQ processor** ([`worker`]): background sweep that auto-archives stale
//!   or over-retried entries, sends alerts ([`notifications`]) and purges
//!   resolved entries
//!
//! [`RecoveryContext`] wires these together from a [`config::RecoveryConfig`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conductor_recovery::{RecoveryContext, TaskFailure};
//! use conductor_recovery::config::RecoveryConfig;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = RecoveryContext::new(RecoveryConfig::default())?;
//!
//! let breakers = context.circuit_breakers();
//! if breakers.is_available("payments") {
//!     breakers.record_failure("payments", Some("connection refused"));
//! }
//!
//! context
//!     .dlq_service()
//!     .add_to_dlq("task-42", json!({"kind": "charge"}), TaskFailure::new("boom"), 5)
//!     .await?;
//!
//! let worker = context.dlq_processor();
//! worker.start().await;
//! // ...
//! worker.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod batch;
pub mod clock;
pub mod config;
pub mod context;
pub mod dlq;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notifications;
pub mod resilience;
pub mod worker;

pub use batch::{BatchItemResult, BatchItemStatus, BatchOperation, BatchResponse};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{ConfigLoader, ConfigurationError, RecoveryConfig};
pub use context::RecoveryContext;
pub use dlq::{
    DeadLetterQueueService, DeadLetterStore, DlqEntry, DlqFilter, DlqStats, DlqStatus,
    InMemoryDeadLetterStore, TaskFailure,
};
pub use error::{RecoveryError, RecoveryResult};
pub use notifications::{NotificationHandler, NotificationKind};
pub use resilience::{
    CircuitBreakerConfig, CircuitBreakerEvent, CircuitBreakerRegistry, CircuitEventKind,
    CircuitState,
};
pub use worker::{DlqProcessorConfig, DlqProcessorWorker, SweepReport, WorkerStats};

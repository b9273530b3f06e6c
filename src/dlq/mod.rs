//! # Dead Letter Queue
//!
//! Holding area for tasks that exhausted their retry budget.
//!
//! - [`models`]: entries, filters, status buckets and statistics
//! - [`store`]: the [`DeadLetterStore`] persistence trait and the in-memory store
//! - [`service`]: [`DeadLetterQueueService`], the business operations used by
//!   API handlers and the DLQ processor worker

pub mod models;
pub mod service;
pub mod store;

pub use models::{
    DlqEntry, DlqEntryUpdate, DlqFilter, DlqStats, DlqStatus, ErrorDetails, NewDlqEntry,
    ResolutionSource, TaskFailure,
};
pub use service::{CallbackError, DeadLetterQueueService, DEFAULT_QUERY_LIMIT};
pub use store::{DeadLetterStore, InMemoryDeadLetterStore, StoreError, StoreResult};

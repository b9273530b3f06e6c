//! # Background Workers
//!
//! [`DlqProcessorWorker`] periodically sweeps the dead-letter queue: it
//! auto-archives entries past their retry budget or age limit, alerts on
//! recently dead-lettered work and purges resolved entries past retention.

pub mod dlq_processor;

pub use dlq_processor::{
    BacklogReport, DlqProcessorConfig, DlqProcessorWorker, PhaseError, SweepPhase, SweepReport,
    WorkerStats, WorkerStatus,
};

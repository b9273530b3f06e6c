//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use conductor_recovery::clock::MockClock;
use conductor_recovery::dlq::{
    DeadLetterQueueService, DeadLetterStore, DlqEntry, DlqEntryUpdate, DlqFilter, DlqStatus,
    InMemoryDeadLetterStore, NewDlqEntry, StoreError, StoreResult,
};
use conductor_recovery::notifications::{NotificationError, NotificationHandler, NotificationKind};
use conductor_recovery::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
use conductor_recovery::worker::{DlqProcessorConfig, DlqProcessorWorker};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Registry over a manually driven clock
pub fn registry_with_clock(config: CircuitBreakerConfig) -> (CircuitBreakerRegistry, Arc<MockClock>) {
    let clock = Arc::new(MockClock::starting_now());
    let registry = CircuitBreakerRegistry::new(config, clock.clone(), 256);
    (registry, clock)
}

/// DLQ service over an in-memory store and a manually driven clock
pub fn dlq_service() -> (Arc<DeadLetterQueueService>, Arc<MockClock>) {
    let clock = Arc::new(MockClock::starting_now());
    let store = Arc::new(InMemoryDeadLetterStore::new(clock.clone()));
    (Arc::new(DeadLetterQueueService::new(store, clock.clone())), clock)
}

pub fn processor(
    config: DlqProcessorConfig,
) -> (DlqProcessorWorker, Arc<DeadLetterQueueService>, Arc<MockClock>) {
    let (service, clock) = dlq_service();
    let worker = DlqProcessorWorker::new(service.clone(), clock.clone(), config);
    (worker, service, clock)
}

/// How a [`RecordingHandler`] responds to each send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerBehavior {
    Succeed,
    Fail,
    /// Sleep longer than any configured notification timeout
    Hang,
}

/// Notification handler that records every send
#[derive(Debug)]
pub struct RecordingHandler {
    behavior: HandlerBehavior,
    sent: Mutex<Vec<(String, NotificationKind)>>,
}

impl RecordingHandler {
    pub fn new(behavior: HandlerBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<(String, NotificationKind)> {
        self.sent.lock().clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent.lock().iter().filter(|(_, k)| *k == kind).count()
    }
}

#[async_trait]
impl NotificationHandler for RecordingHandler {
    async fn send(&self, entry: &DlqEntry, kind: NotificationKind) -> Result<(), NotificationError> {
        self.sent.lock().push((entry.id.clone(), kind));
        match self.behavior {
            HandlerBehavior::Succeed => Ok(()),
            HandlerBehavior::Fail => Err(NotificationError::Transport("smtp unavailable".to_string())),
            HandlerBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// In-memory store whose status listings fail, as when the backing database
/// rejects the pending/failed queries. Every other operation works.
#[derive(Debug)]
pub struct BrokenListingStore {
    inner: InMemoryDeadLetterStore,
}

impl BrokenListingStore {
    pub fn new(clock: Arc<MockClock>) -> Self {
        Self {
            inner: InMemoryDeadLetterStore::new(clock),
        }
    }
}

#[async_trait]
impl DeadLetterStore for BrokenListingStore {
    async fn add_entry(&self, entry: NewDlqEntry) -> StoreResult<DlqEntry> {
        self.inner.add_entry(entry).await
    }

    async fn get_entry(&self, id: &str) -> StoreResult<Option<DlqEntry>> {
        self.inner.get_entry(id).await
    }

    async fn get_entries(
        &self,
        filter: &DlqFilter,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<DlqEntry>> {
        self.inner.get_entries(filter, limit, offset).await
    }

    async fn update_entry(&self, id: &str, update: DlqEntryUpdate) -> StoreResult<DlqEntry> {
        self.inner.update_entry(id, update).await
    }

    async fn delete_entry(&self, id: &str) -> StoreResult<bool> {
        self.inner.delete_entry(id).await
    }

    async fn count_entries(&self, filter: &DlqFilter) -> StoreResult<usize> {
        self.inner.count_entries(filter).await
    }

    async fn cleanup_old_entries(&self, retention_days: u32) -> StoreResult<usize> {
        self.inner.cleanup_old_entries(retention_days).await
    }

    async fn get_by_status(&self, status: DlqStatus, _limit: usize) -> StoreResult<Vec<DlqEntry>> {
        Err(StoreError::Backend(format!("{status} listing unavailable")))
    }
}

/// Worker over a [`BrokenListingStore`]
pub fn processor_with_broken_listings(
    config: DlqProcessorConfig,
) -> (DlqProcessorWorker, Arc<DeadLetterQueueService>, Arc<MockClock>) {
    let clock = Arc::new(MockClock::starting_now());
    let store = Arc::new(BrokenListingStore::new(clock.clone()));
    let service = Arc::new(DeadLetterQueueService::new(store, clock.clone()));
    let worker = DlqProcessorWorker::new(service.clone(), clock.clone(), config);
    (worker, service, clock)
}

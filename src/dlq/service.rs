//! # Dead Letter Queue Service
//!
//! Business operations over a [`DeadLetterStore`]: dead-lettering failed
//! tasks, resubmission, resolution (single and batch), statistics, retention
//! cleanup and fan-out to entry-added callbacks.
//!
//! Every operation returns a [`RecoveryResult`]; store failures are tagged with
//! the operation's `DLQ_*` code and unknown ids surface as `DLQ_NOT_FOUND`.
//! Writes go through `DeadLetterStore::update_entry` as atomic patches, so
//! there is no separate existence check that could race with a delete.
//!
//! ## Usage
//!
//! ```rust
//! use conductor_recovery::dlq::{DeadLetterQueueService, TaskFailure};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let service = DeadLetterQueueService::in_memory();
//!
//! let entry = service
//!     .add_to_dlq("task-7", json!({"kind": "charge"}), TaskFailure::new("gateway timeout"), 3)
//!     .await
//!     .unwrap();
//!
//! service.resolve_dlq_entry(&entry.id, "refunded by hand").await.unwrap();
//! assert_eq!(service.get_dlq_stats().await.unwrap().resolved_entries, 1);
//! # });
//! ```

use crate::batch::{validate_batch_ids, BatchItemResult, BatchOperation, BatchResponse};
use crate::clock::{Clock, SystemClock};
use crate::dlq::store::{DeadLetterStore, InMemoryDeadLetterStore, StoreError};
use crate::dlq::{
    DlqEntry, DlqEntryUpdate, DlqFilter, DlqStats, DlqStatus, NewDlqEntry, ResolutionSource,
    TaskFailure,
};
use crate::error::{codes, RecoveryError, RecoveryResult, ResourceKind};
use crate::metrics::{dlq_entries_added_total, dlq_entries_purged_total, dlq_entries_resolved_total};
use futures::future::BoxFuture;
use futures::FutureExt;
use opentelemetry::KeyValue;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Page size used when callers do not specify one
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// Maximum length of a resubmission reason, in characters
pub const MAX_RESUBMIT_REASON_LEN: usize = 500;

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

type EntryCallback =
    Arc<dyn Fn(DlqEntry) -> BoxFuture<'static, Result<(), CallbackError>> + Send + Sync>;

pub struct DeadLetterQueueService {
    store: Arc<dyn DeadLetterStore>,
    clock: Arc<dyn Clock>,
    callbacks: RwLock<Vec<EntryCallback>>,
}

impl std::fmt::Debug for DeadLetterQueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterQueueService")
            .field("store", &self.store)
            .field("callbacks", &self.callbacks.read().len())
            .finish()
    }
}

impl DeadLetterQueueService {
    pub fn new(store: Arc<dyn DeadLetterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Service over a fresh in-memory store using wall-clock time
    pub fn in_memory() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::new(Arc::new(InMemoryDeadLetterStore::new(clock.clone())), clock)
    }

    pub fn store(&self) -> &Arc<dyn DeadLetterStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Move a task that exhausted its retries into the queue
    pub async fn add_to_dlq(
        &self,
        task_id: &str,
        task_definition: Value,
        failure: TaskFailure,
        retry_count: u32,
    ) -> RecoveryResult<DlqEntry> {
        if task_id.trim().is_empty() {
            return Err(RecoveryError::Validation("taskId must not be blank".to_string()));
        }

        let now = self.clock.now();
        let entry = self
            .store
            .add_entry(NewDlqEntry {
                task_id: task_id.to_string(),
                task_definition,
                error_details: failure.into_details(retry_count, now),
                retry_count,
                added_at: now,
            })
            .await
            .map_err(store_error(codes::DLQ_ADD_ERROR))?;

        warn!(
            dlq_id = %entry.id,
            task_id = %entry.task_id,
            retry_count = entry.retry_count,
            error = %entry.error_details.message,
            "Task moved to dead-letter queue"
        );
        dlq_entries_added_total().add(1, &[]);

        self.notify_callbacks(&entry).await;
        Ok(entry)
    }

    /// Filtered, newest-first page of entries
    pub async fn get_dlq_entries(
        &self,
        filter: &DlqFilter,
        limit: usize,
        offset: usize,
    ) -> RecoveryResult<Vec<DlqEntry>> {
        filter.validate().map_err(RecoveryError::Validation)?;
        self.store
            .get_entries(filter, limit, offset)
            .await
            .map_err(store_error(codes::DLQ_RETRIEVE_ERROR))
    }

    pub async fn get_dlq_entry(&self, id: &str) -> RecoveryResult<DlqEntry> {
        self.store
            .get_entry(id)
            .await
            .map_err(store_error(codes::DLQ_RETRIEVE_ERROR))?
            .ok_or_else(|| RecoveryError::dlq_not_found(id))
    }

    /// Reset the retry budget, optionally replacing the task definition.
    ///
    /// `resolved_at` is not cleared: an entry resolved earlier stays resolved.
    pub async fn resubmit_from_dlq(
        &self,
        id: &str,
        reason: &str,
        new_definition: Option<Value>,
    ) -> RecoveryResult<DlqEntry> {
        validate_reason(reason)?;

        let entry = self
            .store
            .update_entry(id, DlqEntryUpdate::resubmit(reason, new_definition))
            .await
            .map_err(store_error(codes::DLQ_RESUBMIT_ERROR))?;

        info!(dlq_id = %id, task_id = %entry.task_id, reason = %reason, "DLQ entry resubmitted");
        Ok(entry)
    }

    /// Mark an entry resolved. Resolving again overwrites the notes and time.
    pub async fn resolve_dlq_entry(&self, id: &str, notes: &str) -> RecoveryResult<DlqEntry> {
        self.resolve_entry(id, notes, ResolutionSource::Manual, None)
            .await
    }

    /// Resolve on behalf of `source`; with `expected_version` the write fails
    /// with a conflict if the entry changed since it was read.
    pub(crate) async fn resolve_entry(
        &self,
        id: &str,
        notes: &str,
        source: ResolutionSource,
        expected_version: Option<u64>,
    ) -> RecoveryResult<DlqEntry> {
        let mut update = DlqEntryUpdate::resolve(self.clock.now(), notes);
        update.expected_version = expected_version;

        let entry = self
            .store
            .update_entry(id, update)
            .await
            .map_err(store_error(codes::DLQ_RESOLVE_ERROR))?;

        info!(dlq_id = %id, source = source.as_str(), notes = %notes, "DLQ entry resolved");
        dlq_entries_resolved_total().add(1, &[KeyValue::new("reason", source.as_str())]);
        Ok(entry)
    }

    pub async fn get_dlq_stats(&self) -> RecoveryResult<DlqStats> {
        let map_err = store_error(codes::DLQ_STATS_ERROR);

        let total_entries = self
            .store
            .count_entries(&DlqFilter::default())
            .await
            .map_err(&map_err)?;
        let unresolved_entries = self
            .store
            .count_entries(&DlqFilter::unresolved())
            .await
            .map_err(&map_err)?;
        let failed_entries = self
            .store
            .count_entries(&DlqFilter::unresolved().with_retry_range(Some(1), None))
            .await
            .map_err(&map_err)?;
        let all = self
            .store
            .get_entries(&DlqFilter::default(), usize::MAX, 0)
            .await
            .map_err(&map_err)?;

        let now = self.clock.now();
        let oldest_entry_age_ms = all
            .iter()
            .map(|entry| entry.added_at)
            .min()
            .map_or(0, |oldest| (now - oldest).num_milliseconds());
        let average_retry_count = if all.is_empty() {
            0.0
        } else {
            all.iter().map(|e| f64::from(e.retry_count)).sum::<f64>() / all.len() as f64
        };

        Ok(DlqStats {
            total_entries,
            unresolved_entries,
            resolved_entries: total_entries.saturating_sub(unresolved_entries),
            failed_entries,
            oldest_entry_age_ms,
            average_retry_count,
        })
    }

    /// Resolve every existing id; unknown ids are skipped. Returns how many were resolved.
    pub async fn batch_resolve_dlq(&self, ids: &[String], notes: &str) -> RecoveryResult<usize> {
        let mut resolved = 0;
        for id in ids {
            match self
                .store
                .update_entry(id, DlqEntryUpdate::resolve(self.clock.now(), notes))
                .await
            {
                Ok(_) => resolved += 1,
                Err(StoreError::NotFound(_)) => {
                    debug!(dlq_id = %id, "Skipping unknown DLQ entry in batch resolve");
                }
                Err(e) => return Err(store_error(codes::DLQ_BATCH_ERROR)(e)),
            }
        }

        if resolved > 0 {
            dlq_entries_resolved_total()
                .add(resolved as u64, &[KeyValue::new("reason", ResolutionSource::Batch.as_str())]);
        }
        info!(requested = ids.len(), resolved, "Batch resolved DLQ entries");
        Ok(resolved)
    }

    /// Batch resolve with a per-item outcome for each requested id
    pub async fn batch_resolve_detailed(
        &self,
        ids: &[String],
        notes: Option<&str>,
    ) -> RecoveryResult<BatchResponse> {
        validate_batch_ids(ids)?;

        let notes = notes.filter(|n| !n.trim().is_empty());
        let message = notes.map_or_else(
            || "Resolved".to_string(),
            |notes| format!("Resolved with notes: {notes}"),
        );

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self
                .resolve_entry(id, notes.unwrap_or("Resolved"), ResolutionSource::Batch, None)
                .await;
            results.push(match outcome {
                Ok(_) => BatchItemResult::success(id, message.clone()),
                Err(e) => BatchItemResult::failed(id, &e),
            });
        }

        Ok(BatchResponse::from_results(
            BatchOperation::DlqResolve,
            results,
            self.clock.now(),
        ))
    }

    /// Purge resolved entries older than the retention window
    pub async fn cleanup_dlq(&self, retention_days: u32) -> RecoveryResult<usize> {
        if retention_days == 0 {
            return Err(RecoveryError::Validation(
                "retentionDays must be greater than 0".to_string(),
            ));
        }

        let deleted = self
            .store
            .cleanup_old_entries(retention_days)
            .await
            .map_err(store_error(codes::DLQ_CLEANUP_ERROR))?;

        if deleted > 0 {
            info!(deleted, retention_days, "Purged resolved DLQ entries past retention");
            dlq_entries_purged_total().add(deleted as u64, &[]);
        }
        Ok(deleted)
    }

    pub async fn get_pending_entries(&self, limit: usize) -> RecoveryResult<Vec<DlqEntry>> {
        self.store
            .get_by_status(DlqStatus::Pending, limit)
            .await
            .map_err(store_error(codes::DLQ_PENDING_ERROR))
    }

    /// Unresolved entries that were retried at least once
    pub async fn get_failed_entries(&self, limit: usize) -> RecoveryResult<Vec<DlqEntry>> {
        self.store
            .get_by_status(DlqStatus::Failed, limit)
            .await
            .map_err(store_error(codes::DLQ_FAILED_ERROR))
    }

    /// Register a callback run after every successful `add_to_dlq`
    pub fn on_entry_added<F, Fut>(&self, callback: F)
    where
        F: Fn(DlqEntry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        let callback: EntryCallback = Arc::new(move |entry| callback(entry).boxed());
        self.callbacks.write().push(callback);
    }

    /// Run every callback in registration order. Errors and panics are logged
    /// and do not stop the remaining callbacks.
    pub async fn notify_callbacks(&self, entry: &DlqEntry) {
        let callbacks: Vec<EntryCallback> = self.callbacks.read().clone();

        for (index, callback) in callbacks.iter().enumerate() {
            // The call itself runs inside the guarded future, so a panic before
            // the first await is caught too
            let outcome = AssertUnwindSafe(async { callback(entry.clone()).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        dlq_id = %entry.id,
                        callback = index,
                        error = %e,
                        "DLQ entry callback failed"
                    );
                }
                Err(panic) => {
                    error!(
                        dlq_id = %entry.id,
                        callback = index,
                        panic = panic_message(panic.as_ref()),
                        "DLQ entry callback panicked"
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn validate_reason(reason: &str) -> RecoveryResult<()> {
    let len = reason.trim().chars().count();
    if len == 0 {
        return Err(RecoveryError::Validation(
            "Resubmit reason must not be blank".to_string(),
        ));
    }
    if reason.chars().count() > MAX_RESUBMIT_REASON_LEN {
        return Err(RecoveryError::Validation(format!(
            "Resubmit reason must be at most {MAX_RESUBMIT_REASON_LEN} characters"
        )));
    }
    Ok(())
}

/// Map a store error onto the service taxonomy, tagging backend failures with `code`
fn store_error(code: &'static str) -> impl Fn(StoreError) -> RecoveryError {
    move |err| match err {
        StoreError::NotFound(id) => RecoveryError::dlq_not_found(id),
        StoreError::VersionConflict { id, .. } => RecoveryError::Conflict {
            resource: ResourceKind::DlqEntry,
            id,
        },
        StoreError::Backend(reason) => RecoveryError::store(code, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> (DeadLetterQueueService, Arc<MockClock>) {
        let clock = Arc::new(MockClock::starting_now());
        let store = Arc::new(InMemoryDeadLetterStore::new(clock.clone()));
        (DeadLetterQueueService::new(store, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_add_rejects_blank_task_id() {
        let (service, _) = service();
        let err = service
            .add_to_dlq(" ", json!({}), TaskFailure::new("boom"), 0)
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn test_resubmit_reason_bounds() {
        let (service, _) = service();
        let entry = service
            .add_to_dlq("task-1", json!({}), TaskFailure::new("boom"), 2)
            .await
            .unwrap();

        assert!(service.resubmit_from_dlq(&entry.id, "", None).await.is_err());
        let long = "x".repeat(MAX_RESUBMIT_REASON_LEN + 1);
        assert!(service.resubmit_from_dlq(&entry.id, &long, None).await.is_err());

        let err = service
            .resubmit_from_dlq("missing", "retry", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::DLQ_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_callbacks_continue_after_failure() {
        let (service, _) = service();
        let calls = Arc::new(AtomicUsize::new(0));

        service.on_entry_added(|_| async { Err::<(), CallbackError>("smtp down".into()) });
        let counter = calls.clone();
        service.on_entry_added(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        service
            .add_to_dlq("task-1", json!({}), TaskFailure::new("boom"), 0)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conflicting_resolve_is_reported() {
        let (service, _) = service();
        let entry = service
            .add_to_dlq("task-1", json!({}), TaskFailure::new("boom"), 0)
            .await
            .unwrap();
        service.resolve_dlq_entry(&entry.id, "manual").await.unwrap();

        let err = service
            .resolve_entry(&entry.id, "auto", ResolutionSource::AutoAge, Some(entry.version))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::DLQ_CONFLICT);
    }

    #[tokio::test]
    async fn test_cleanup_rejects_zero_retention() {
        let (service, _) = service();
        assert!(service.cleanup_dlq(0).await.is_err());
        assert_eq!(service.cleanup_dlq(30).await.unwrap(), 0);
    }
}

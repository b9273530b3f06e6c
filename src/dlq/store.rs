//! # Dead Letter Store
//!
//! Persistence interface for DLQ entries plus the in-memory reference
//! implementation.
//!
//! ## Ordering
//!
//! Queries return entries newest first by `added_at`. Entries added at the
//! same instant are ordered by insertion, newest first, so pagination is
//! stable.
//!
//! ## Concurrent writers
//!
//! `update_entry` applies its patch under the entry's lock and bumps
//! `version`. Callers that computed a patch from a previously read entry pass
//! `expected_version` to turn the write into a compare-and-swap.

use crate::clock::Clock;
use crate::dlq::{DlqEntry, DlqEntryUpdate, DlqFilter, DlqStatus, NewDlqEntry};
use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("DLQ entry {0} not found")]
    NotFound(String),

    #[error("DLQ entry {id} version conflict: expected {expected}, found {actual}")]
    VersionConflict { id: String, expected: u64, actual: u64 },

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Pluggable persistence for DLQ entries
#[async_trait]
pub trait DeadLetterStore: Send + Sync + std::fmt::Debug {
    async fn add_entry(&self, entry: NewDlqEntry) -> StoreResult<DlqEntry>;

    async fn get_entry(&self, id: &str) -> StoreResult<Option<DlqEntry>>;

    /// Matching entries, newest first, then `offset`/`limit` applied
    async fn get_entries(
        &self,
        filter: &DlqFilter,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<DlqEntry>>;

    /// Apply a patch atomically. Fails with [`StoreError::NotFound`] for an unknown id.
    async fn update_entry(&self, id: &str, update: DlqEntryUpdate) -> StoreResult<DlqEntry>;

    async fn delete_entry(&self, id: &str) -> StoreResult<bool>;

    async fn count_entries(&self, filter: &DlqFilter) -> StoreResult<usize>;

    /// Delete resolved entries whose `resolved_at` is older than the window.
    /// Pending entries are never deleted.
    async fn cleanup_old_entries(&self, retention_days: u32) -> StoreResult<usize>;

    async fn get_by_status(&self, status: DlqStatus, limit: usize) -> StoreResult<Vec<DlqEntry>>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: DlqEntry,
    seq: u64,
}

/// In-process store backed by a concurrent map
#[derive(Debug)]
pub struct InMemoryDeadLetterStore {
    entries: DashMap<String, StoredEntry>,
    next_seq: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl InMemoryDeadLetterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of entries matching `predicate`, newest first
    fn sorted_matching(&self, predicate: impl Fn(&DlqEntry) -> bool) -> Vec<DlqEntry> {
        let mut matched: Vec<(DlqEntry, u64)> = self
            .entries
            .iter()
            .filter(|stored| predicate(&stored.entry))
            .map(|stored| (stored.entry.clone(), stored.seq))
            .collect();

        matched.sort_by(|(a, a_seq), (b, b_seq)| {
            b.added_at.cmp(&a.added_at).then_with(|| b_seq.cmp(a_seq))
        });
        matched.into_iter().map(|(entry, _)| entry).collect()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn add_entry(&self, entry: NewDlqEntry) -> StoreResult<DlqEntry> {
        let id = format!("dlq-{}", Uuid::new_v4());
        let stored = DlqEntry {
            id: id.clone(),
            task_id: entry.task_id,
            task_definition: entry.task_definition,
            error_details: entry.error_details,
            retry_count: entry.retry_count,
            added_at: entry.added_at,
            resolved_at: None,
            resolution_notes: None,
            version: 0,
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id,
            StoredEntry {
                entry: stored.clone(),
                seq,
            },
        );
        Ok(stored)
    }

    async fn get_entry(&self, id: &str) -> StoreResult<Option<DlqEntry>> {
        Ok(self.entries.get(id).map(|stored| stored.entry.clone()))
    }

    async fn get_entries(
        &self,
        filter: &DlqFilter,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<DlqEntry>> {
        Ok(self
            .sorted_matching(|entry| filter.matches(entry))
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn update_entry(&self, id: &str, update: DlqEntryUpdate) -> StoreResult<DlqEntry> {
        let mut stored = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(expected) = update.expected_version {
            if stored.entry.version != expected {
                return Err(StoreError::VersionConflict {
                    id: id.to_string(),
                    expected,
                    actual: stored.entry.version,
                });
            }
        }

        update.apply(&mut stored.entry);
        Ok(stored.entry.clone())
    }

    async fn delete_entry(&self, id: &str) -> StoreResult<bool> {
        Ok(self.entries.remove(id).is_some())
    }

    async fn count_entries(&self, filter: &DlqFilter) -> StoreResult<usize> {
        Ok(self
            .entries
            .iter()
            .filter(|stored| filter.matches(&stored.entry))
            .count())
    }

    async fn cleanup_old_entries(&self, retention_days: u32) -> StoreResult<usize> {
        let cutoff = self.clock.now() - Duration::days(i64::from(retention_days));
        let mut deleted = 0;

        self.entries.retain(|_, stored| {
            let expired = stored
                .entry
                .resolved_at
                .is_some_and(|resolved_at| resolved_at < cutoff);
            if expired {
                deleted += 1;
            }
            !expired
        });

        Ok(deleted)
    }

    async fn get_by_status(&self, status: DlqStatus, limit: usize) -> StoreResult<Vec<DlqEntry>> {
        let mut entries = self.sorted_matching(|entry| status.matches(entry));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::dlq::TaskFailure;
    use serde_json::json;

    fn new_entry(task_id: &str, retry_count: u32, clock: &MockClock) -> NewDlqEntry {
        NewDlqEntry {
            task_id: task_id.to_string(),
            task_definition: json!({ "task": task_id }),
            error_details: TaskFailure::new("boom").into_details(retry_count, clock.now()),
            retry_count,
            added_at: clock.now(),
        }
    }

    fn store() -> (InMemoryDeadLetterStore, Arc<MockClock>) {
        let clock = Arc::new(MockClock::starting_now());
        (InMemoryDeadLetterStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_entries_sorted_newest_first_with_stable_ties() {
        let (store, clock) = store();
        let first = store.add_entry(new_entry("a", 0, &clock)).await.unwrap();
        let second = store.add_entry(new_entry("b", 0, &clock)).await.unwrap();
        clock.advance_ms(10);
        let third = store.add_entry(new_entry("c", 0, &clock)).await.unwrap();

        let ids: Vec<_> = store
            .get_entries(&DlqFilter::default(), 10, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![third.id.clone(), second.id, first.id]);

        let page = store.get_entries(&DlqFilter::default(), 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_ne!(page[0].id, third.id);
    }

    #[tokio::test]
    async fn test_update_missing_entry_fails() {
        let (store, _) = store();
        let err = store
            .update_entry("missing", DlqEntryUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let (store, clock) = store();
        let entry = store.add_entry(new_entry("a", 1, &clock)).await.unwrap();

        store
            .update_entry(&entry.id, DlqEntryUpdate::resolve(clock.now(), "first"))
            .await
            .unwrap();

        let stale = DlqEntryUpdate::resolve(clock.now(), "second").with_expected_version(entry.version);
        let err = store.update_entry(&entry.id, stale).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, actual: 1, .. }));

        let stored = store.get_entry(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.resolution_notes.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_cleanup_only_removes_stale_resolved_entries() {
        let (store, clock) = store();
        let old_pending = store.add_entry(new_entry("pending", 0, &clock)).await.unwrap();
        let old_resolved = store.add_entry(new_entry("resolved", 0, &clock)).await.unwrap();
        store
            .update_entry(&old_resolved.id, DlqEntryUpdate::resolve(clock.now(), "done"))
            .await
            .unwrap();

        clock.advance(Duration::days(31));
        let fresh_resolved = store.add_entry(new_entry("fresh", 0, &clock)).await.unwrap();
        store
            .update_entry(&fresh_resolved.id, DlqEntryUpdate::resolve(clock.now(), "done"))
            .await
            .unwrap();

        let deleted = store.cleanup_old_entries(30).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_entry(&old_resolved.id).await.unwrap().is_none());
        assert!(store.get_entry(&old_pending.id).await.unwrap().is_some());
        assert!(store.get_entry(&fresh_resolved.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_by_status_and_count() {
        let (store, clock) = store();
        store.add_entry(new_entry("a", 0, &clock)).await.unwrap();
        store.add_entry(new_entry("b", 3, &clock)).await.unwrap();
        let resolved = store.add_entry(new_entry("c", 0, &clock)).await.unwrap();
        store
            .update_entry(&resolved.id, DlqEntryUpdate::resolve(clock.now(), "ok"))
            .await
            .unwrap();

        assert_eq!(store.get_by_status(DlqStatus::Pending, 10).await.unwrap().len(), 2);
        assert_eq!(store.get_by_status(DlqStatus::Failed, 10).await.unwrap().len(), 1);
        assert_eq!(store.get_by_status(DlqStatus::Resolved, 10).await.unwrap().len(), 1);
        assert_eq!(store.get_by_status(DlqStatus::Pending, 1).await.unwrap().len(), 1);
        assert_eq!(store.count_entries(&DlqFilter::unresolved()).await.unwrap(), 2);
        assert!(store.delete_entry(&resolved.id).await.unwrap());
        assert!(!store.delete_entry(&resolved.id).await.unwrap());
    }
}

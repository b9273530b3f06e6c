//! Dead-letter queue domain models.
//!
//! An entry is "pending" while `resolved_at` is `None`. Resolving sets the
//! timestamp; retention cleanup only ever deletes resolved entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Failure captured when a task is dead-lettered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub message: String,
    pub stack: Option<String>,
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Total attempts made, i.e. `retry_count + 1`
    pub attempts: u32,
}

/// The error reported by the retry coordinator, before it is stamped into [`ErrorDetails`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFailure {
    pub message: String,
    pub stack: Option<String>,
    pub code: Option<String>,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture an error's message, with its `source()` chain rendered as the stack
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        Self {
            message: error.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
            code: None,
        }
    }

    pub(crate) fn into_details(self, retry_count: u32, timestamp: DateTime<Utc>) -> ErrorDetails {
        ErrorDetails {
            message: self.message,
            stack: self.stack,
            code: self.code,
            timestamp,
            attempts: retry_count.saturating_add(1),
        }
    }
}

/// A task that exhausted its retry budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqEntry {
    /// Assigned by the store at insert, never changes
    pub id: String,
    pub task_id: String,
    pub task_definition: Value,
    pub error_details: ErrorDetails,
    pub retry_count: u32,
    pub added_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    /// Incremented by every store update; used for compare-and-swap writes
    pub version: u64,
}

impl DlqEntry {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.resolved_at.is_none()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.added_at).num_milliseconds()
    }
}

/// Insert payload; the store assigns `id` and `version`
#[derive(Debug, Clone, PartialEq)]
pub struct NewDlqEntry {
    pub task_id: String,
    pub task_definition: Value,
    pub error_details: ErrorDetails,
    pub retry_count: u32,
    pub added_at: DateTime<Utc>,
}

/// Query filter. Every present field must match; ranges are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqFilter {
    pub task_id: Option<String>,
    pub resolved: Option<bool>,
    pub min_retry_count: Option<u32>,
    pub max_retry_count: Option<u32>,
    pub added_after: Option<DateTime<Utc>>,
    pub added_before: Option<DateTime<Utc>>,
}

impl DlqFilter {
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Default::default()
        }
    }

    pub fn unresolved() -> Self {
        Self {
            resolved: Some(false),
            ..Default::default()
        }
    }

    pub fn resolved() -> Self {
        Self {
            resolved: Some(true),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_retry_range(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_retry_count = min;
        self.max_retry_count = max;
        self
    }

    #[must_use]
    pub fn with_added_range(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.added_after = after;
        self.added_before = before;
        self
    }

    /// Reject filters that can never match or are malformed
    pub fn validate(&self) -> Result<(), String> {
        if let Some(task_id) = &self.task_id {
            if task_id.trim().is_empty() {
                return Err("taskId filter must not be blank".to_string());
            }
        }
        if let (Some(min), Some(max)) = (self.min_retry_count, self.max_retry_count) {
            if min > max {
                return Err(format!(
                    "minRetryCount ({min}) must not exceed maxRetryCount ({max})"
                ));
            }
        }
        if let (Some(after), Some(before)) = (self.added_after, self.added_before) {
            if after > before {
                return Err("addedAfter must not be later than addedBefore".to_string());
            }
        }
        Ok(())
    }

    pub fn matches(&self, entry: &DlqEntry) -> bool {
        self.task_id
            .as_deref()
            .map_or(true, |task_id| entry.task_id == task_id)
            && self
                .resolved
                .map_or(true, |resolved| entry.is_resolved() == resolved)
            && self
                .min_retry_count
                .map_or(true, |min| entry.retry_count >= min)
            && self
                .max_retry_count
                .map_or(true, |max| entry.retry_count <= max)
            && self.added_after.map_or(true, |after| entry.added_at >= after)
            && self
                .added_before
                .map_or(true, |before| entry.added_at <= before)
    }
}

/// Status buckets used by `DeadLetterStore::get_by_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqStatus {
    /// Not yet resolved
    Pending,
    /// Resolved and never retried.
    ///
    /// Entries resolved after one or more retries fall in no bucket.
    Resolved,
    /// Not yet resolved and retried at least once; a subset of `Pending`
    Failed,
}

impl DlqStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
        }
    }

    pub fn matches(self, entry: &DlqEntry) -> bool {
        match self {
            Self::Pending => entry.is_pending(),
            Self::Resolved => entry.is_resolved() && entry.retry_count == 0,
            Self::Failed => entry.is_pending() && entry.retry_count > 0,
        }
    }
}

impl fmt::Display for DlqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DlqStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown DLQ status: {other}")),
        }
    }
}

/// Why an entry was resolved; used as a metrics label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Manual,
    Batch,
    AutoRetryLimit,
    AutoAge,
}

impl ResolutionSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Batch => "batch",
            Self::AutoRetryLimit => "auto_retry_limit",
            Self::AutoAge => "auto_age",
        }
    }
}

/// Partial update applied atomically by the store.
///
/// `None` leaves a field untouched. The nested options on `resolved_at` and
/// `resolution_notes` allow clearing a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DlqEntryUpdate {
    pub task_definition: Option<Value>,
    pub retry_count: Option<u32>,
    pub resolved_at: Option<Option<DateTime<Utc>>>,
    pub resolution_notes: Option<Option<String>>,
    /// Reject the update unless the stored version still equals this
    pub expected_version: Option<u64>,
}

impl DlqEntryUpdate {
    pub fn resolve(at: DateTime<Utc>, notes: impl Into<String>) -> Self {
        Self {
            resolved_at: Some(Some(at)),
            resolution_notes: Some(Some(notes.into())),
            ..Default::default()
        }
    }

    /// Reset the retry budget and note the reason. `resolved_at` is left as is.
    pub fn resubmit(reason: &str, new_definition: Option<Value>) -> Self {
        Self {
            task_definition: new_definition,
            retry_count: Some(0),
            resolution_notes: Some(Some(format!("Resubmitted: {reason}"))),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn apply(self, entry: &mut DlqEntry) {
        if let Some(definition) = self.task_definition {
            entry.task_definition = definition;
        }
        if let Some(retry_count) = self.retry_count {
            entry.retry_count = retry_count;
        }
        if let Some(resolved_at) = self.resolved_at {
            entry.resolved_at = resolved_at;
        }
        if let Some(notes) = self.resolution_notes {
            entry.resolution_notes = notes;
        }
        entry.version += 1;
    }
}

/// Aggregate queue statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqStats {
    pub total_entries: usize,
    pub unresolved_entries: usize,
    pub resolved_entries: usize,
    /// Unresolved entries retried at least once
    pub failed_entries: usize,
    /// Age of the oldest entry in milliseconds, 0 when empty
    pub oldest_entry_age_ms: i64,
    /// Mean retry count over all entries, resolved ones included
    pub average_retry_count: f64,
}

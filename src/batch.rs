//! Bulk operation results.
//!
//! Batch endpoints report one [`BatchItemResult`] per requested id plus
//! aggregate counts. A failing item never fails the batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RecoveryError, RecoveryResult};

/// Upper bound on ids accepted by a single batch call
pub const MAX_ITEMS_PER_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOperation {
    #[serde(rename = "dlq.resolve")]
    DlqResolve,
    #[serde(rename = "circuit_breakers.reset")]
    CircuitBreakerReset,
}

impl BatchOperation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DlqResolve => "dlq.resolve",
            Self::CircuitBreakerReset => "circuit_breakers.reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Success,
    Failed,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub id: String,
    pub status: BatchItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchItemResult {
    pub fn success(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: BatchItemStatus::Success,
            retry_id: None,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn failed(id: impl Into<String>, error: &RecoveryError) -> Self {
        Self {
            id: id.into(),
            status: BatchItemStatus::Failed,
            retry_id: None,
            error: Some(error.to_string()),
            message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_id: String,
    pub operation: BatchOperation,
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<BatchItemResult>,
    pub timestamp: DateTime<Utc>,
}

impl BatchResponse {
    /// Tally per-item results into a response
    pub fn from_results(
        operation: BatchOperation,
        results: Vec<BatchItemResult>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let success_count = results
            .iter()
            .filter(|r| r.status == BatchItemStatus::Success)
            .count();
        let failure_count = results
            .iter()
            .filter(|r| r.status == BatchItemStatus::Failed)
            .count();

        Self {
            batch_id: format!("batch-{}", Uuid::new_v4()),
            operation,
            total_items: results.len(),
            success_count,
            failure_count,
            results,
            timestamp,
        }
    }
}

/// Reject empty batches, oversized batches and blank ids
pub fn validate_batch_ids(ids: &[String]) -> RecoveryResult<()> {
    if ids.is_empty() {
        return Err(RecoveryError::Validation(
            "Items array cannot be empty".to_string(),
        ));
    }
    if ids.len() > MAX_ITEMS_PER_BATCH {
        return Err(RecoveryError::Validation(format!(
            "Maximum {MAX_ITEMS_PER_BATCH} items per batch allowed, got {}",
            ids.len()
        )));
    }
    if let Some(position) = ids.iter().position(|id| id.trim().is_empty()) {
        return Err(RecoveryError::Validation(format!(
            "Invalid id at position {position}"
        )));
    }
    Ok(())
}

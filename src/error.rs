//! # Error Types
//!
//! Crate-wide error taxonomy for the recovery core.
//!
//! Every public registry and service operation returns [`RecoveryResult`]
//! instead of panicking. Each error carries a stable string code so the
//! consuming HTTP layer can map failures onto response statuses without
//! inspecting messages.

use thiserror::Error;

/// Stable result codes surfaced to API consumers.
pub mod codes {
    pub const CIRCUIT_BREAKER_NOT_FOUND: &str = "CIRCUIT_BREAKER_NOT_FOUND";
    pub const CIRCUIT_BREAKER_EXISTS: &str = "CIRCUIT_BREAKER_EXISTS";
    pub const DLQ_NOT_FOUND: &str = "DLQ_NOT_FOUND";
    pub const DLQ_CONFLICT: &str = "DLQ_CONFLICT";
    pub const DLQ_ADD_ERROR: &str = "DLQ_ADD_ERROR";
    pub const DLQ_RETRIEVE_ERROR: &str = "DLQ_RETRIEVE_ERROR";
    pub const DLQ_RESUBMIT_ERROR: &str = "DLQ_RESUBMIT_ERROR";
    pub const DLQ_RESOLVE_ERROR: &str = "DLQ_RESOLVE_ERROR";
    pub const DLQ_STATS_ERROR: &str = "DLQ_STATS_ERROR";
    pub const DLQ_BATCH_ERROR: &str = "DLQ_BATCH_ERROR";
    pub const DLQ_CLEANUP_ERROR: &str = "DLQ_CLEANUP_ERROR";
    pub const DLQ_PENDING_ERROR: &str = "DLQ_PENDING_ERROR";
    pub const DLQ_FAILED_ERROR: &str = "DLQ_FAILED_ERROR";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
    pub const NOTIFICATION_ERROR: &str = "NOTIFICATION_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
}

/// Kind of resource an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    CircuitBreaker,
    DlqEntry,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircuitBreaker => write!(f, "Circuit breaker"),
            Self::DlqEntry => write!(f, "DLQ entry"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecoveryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: ResourceKind, id: String },

    #[error("{resource} already exists: {id}")]
    AlreadyExists { resource: ResourceKind, id: String },

    /// The entry changed between read and write
    #[error("{resource} was modified concurrently: {id}")]
    Conflict { resource: ResourceKind, id: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A store failure, tagged with the code of the operation that hit it
    #[error("Store error ({code}): {reason}")]
    Store { code: &'static str, reason: String },

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl RecoveryError {
    pub fn circuit_not_found(service_name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: ResourceKind::CircuitBreaker,
            id: service_name.into(),
        }
    }

    pub fn dlq_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: ResourceKind::DlqEntry,
            id: id.into(),
        }
    }

    pub fn store(code: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Store {
            code,
            reason: reason.to_string(),
        }
    }

    /// Stable code for this error
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => codes::VALIDATION_ERROR,
            Self::NotFound {
                resource: ResourceKind::CircuitBreaker,
                ..
            } => codes::CIRCUIT_BREAKER_NOT_FOUND,
            Self::NotFound {
                resource: ResourceKind::DlqEntry,
                ..
            } => codes::DLQ_NOT_FOUND,
            Self::AlreadyExists { .. } => codes::CIRCUIT_BREAKER_EXISTS,
            Self::Conflict { .. } => codes::DLQ_CONFLICT,
            Self::Configuration(_) => codes::CONFIGURATION_ERROR,
            Self::Store { code, .. } => code,
            Self::Notification(_) => codes::NOTIFICATION_ERROR,
            Self::Timeout { .. } => codes::TIMEOUT,
        }
    }

    /// HTTP status the consuming API layer should respond with
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => 409,
            Self::Validation(_) | Self::Configuration(_) => 400,
            Self::Store { .. } | Self::Notification(_) | Self::Timeout { .. } => 500,
        }
    }

    /// Whether retrying the same operation later could succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Store { .. } | Self::Notification(_) | Self::Timeout { .. }
        )
    }
}

impl From<crate::config::ConfigurationError> for RecoveryError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;

//! # DLQ Notifications
//!
//! Outbound alerts about dead-letter entries, sent by the DLQ processor worker.
//!
//! The worker only depends on the [`NotificationHandler`] trait. Two transports
//! are provided:
//!
//! - [`LogNotificationHandler`]: renders the email-style alert into the log
//! - [`WebhookNotificationHandler`]: POSTs a JSON payload to an HTTP endpoint
//!
//! [`handler_from_config`] builds whichever one [`NotificationConfig`] selects.

pub mod log;
pub mod webhook;

use crate::config::{NotificationConfig, NotificationTransport};
use crate::dlq::DlqEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use log::LogNotificationHandler;
pub use webhook::{WebhookNotificationHandler, WebhookPayload};

/// Why an entry is being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Still unresolved shortly after being dead-lettered
    Pending,
    /// Auto-archived by the worker
    Archived,
    Failed,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Archived => "archived",
            Self::Failed => "failed",
        }
    }

    /// Event name carried in webhook payloads, e.g. `dlq.archived`
    pub fn event_name(self) -> String {
        format!("dlq.{}", self.as_str())
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Notification timed out")]
    Timeout,

    #[error("Invalid notification payload: {0}")]
    InvalidPayload(String),
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Delivers alerts about a single DLQ entry
#[async_trait]
pub trait NotificationHandler: Send + Sync + fmt::Debug {
    async fn send(&self, entry: &DlqEntry, kind: NotificationKind) -> Result<(), NotificationError>;
}

/// Build the handler selected by `config`; `None` when notifications are disabled
pub fn handler_from_config(
    config: &NotificationConfig,
) -> Result<Option<Arc<dyn NotificationHandler>>, NotificationError> {
    match config.transport {
        NotificationTransport::None => Ok(None),
        NotificationTransport::Log => Ok(Some(Arc::new(LogNotificationHandler::new(
            config.recipient.clone(),
        )))),
        NotificationTransport::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                NotificationError::Transport("webhook transport requires webhook_url".to_string())
            })?;
            let handler = WebhookNotificationHandler::new(url, config.webhook_timeout_ms)?;
            Ok(Some(Arc::new(handler)))
        }
    }
}

//! Email-style alerts written to the log.

use super::{NotificationError, NotificationHandler, NotificationKind};
use crate::dlq::DlqEntry;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone)]
pub struct LogNotificationHandler {
    recipient: String,
}

impl LogNotificationHandler {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
        }
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn subject(kind: NotificationKind) -> &'static str {
        match kind {
            NotificationKind::Pending => "DLQ Alert: Unresolved Task",
            NotificationKind::Archived => "DLQ Alert: Task Archived",
            NotificationKind::Failed => "DLQ Alert: Task Failed",
        }
    }

    pub fn format_message(entry: &DlqEntry, kind: NotificationKind) -> String {
        format!(
            "Task ID: {}\nDLQ ID: {}\nStatus: {}\nRetry Count: {}\nAdded: {}\nError: {}",
            entry.task_id,
            entry.id,
            kind,
            entry.retry_count,
            entry.added_at.to_rfc3339(),
            entry.error_details.message,
        )
    }
}

#[async_trait]
impl NotificationHandler for LogNotificationHandler {
    async fn send(&self, entry: &DlqEntry, kind: NotificationKind) -> Result<(), NotificationError> {
        info!(
            to = %self.recipient,
            subject = Self::subject(kind),
            dlq_id = %entry.id,
            body = %Self::format_message(entry, kind),
            "DLQ notification"
        );
        Ok(())
    }
}

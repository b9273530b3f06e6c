//! JSON webhook transport.

use super::{NotificationError, NotificationHandler, NotificationKind};
use crate::dlq::DlqEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub event: String,
    pub timestamp: String,
    pub entry: WebhookEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEntry {
    pub id: String,
    pub task_id: String,
    pub retry_count: u32,
    pub error_message: String,
}

impl WebhookPayload {
    pub fn new(entry: &DlqEntry, kind: NotificationKind, at: DateTime<Utc>) -> Self {
        Self {
            event: kind.event_name(),
            timestamp: at.to_rfc3339(),
            entry: WebhookEntry {
                id: entry.id.clone(),
                task_id: entry.task_id.clone(),
                retry_count: entry.retry_count,
                error_message: entry.error_details.message.clone(),
            },
        }
    }
}

pub struct WebhookNotificationHandler {
    client: Client,
    url: String,
    timeout_ms: u64,
}

impl std::fmt::Debug for WebhookNotificationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotificationHandler")
            .field("url", &self.url)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl WebhookNotificationHandler {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(format!("conductor-recovery/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            timeout_ms,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationHandler for WebhookNotificationHandler {
    async fn send(&self, entry: &DlqEntry, kind: NotificationKind) -> Result<(), NotificationError> {
        let payload = WebhookPayload::new(entry, kind, Utc::now());
        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = %self.url, event = %payload.event, dlq_id = %entry.id, "Webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::TaskFailure;
    use serde_json::json;

    #[test]
    fn test_payload_shape() {
        let now = Utc::now();
        let entry = DlqEntry {
            id: "dlq-7".to_string(),
            task_id: "task-7".to_string(),
            task_definition: json!({"kind": "email"}),
            error_details: TaskFailure::new("smtp timeout").into_details(3, now),
            retry_count: 3,
            added_at: now,
            resolved_at: None,
            resolution_notes: None,
            version: 1,
        };

        let payload = serde_json::to_value(WebhookPayload::new(&entry, NotificationKind::Pending, now))
            .unwrap();
        assert_eq!(payload["event"], "dlq.pending");
        assert_eq!(payload["timestamp"], now.to_rfc3339());
        assert_eq!(
            payload["entry"],
            json!({
                "id": "dlq-7",
                "taskId": "task-7",
                "retryCount": 3,
                "errorMessage": "smtp timeout"
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let handler = WebhookNotificationHandler::new("http://127.0.0.1:9/dlq", 500).unwrap();
        let now = Utc::now();
        let entry = DlqEntry {
            id: "dlq-8".to_string(),
            task_id: "task-8".to_string(),
            task_definition: json!({}),
            error_details: TaskFailure::new("boom").into_details(0, now),
            retry_count: 0,
            added_at: now,
            resolved_at: None,
            resolution_notes: None,
            version: 1,
        };

        let result = handler.send(&entry, NotificationKind::Failed).await;
        assert!(matches!(
            result,
            Err(NotificationError::Transport(_) | NotificationError::Timeout)
        ));
    }
}

//! Typed circuit breaker events and subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitEventKind {
    Opened,
    Closed,
    HalfOpen,
    Success,
    Failure,
}

impl CircuitEventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Whether this event marks a state change rather than a call outcome
    pub const fn is_transition(&self) -> bool {
        matches!(self, Self::Opened | Self::Closed | Self::HalfOpen)
    }
}

impl std::fmt::Display for CircuitEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerEvent {
    pub service_name: String,
    #[serde(rename = "eventType")]
    pub kind: CircuitEventKind,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

/// Broadcast side of the event stream
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<CircuitBreakerEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all subscribers. Having none is not an error.
    pub(crate) fn publish(&self, event: CircuitBreakerEvent) {
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self, filter: Option<CircuitEventKind>) -> CircuitEventSubscription {
        CircuitEventSubscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving end of either the full event stream or a single event kind
#[derive(Debug)]
pub struct CircuitEventSubscription {
    receiver: broadcast::Receiver<CircuitBreakerEvent>,
    filter: Option<CircuitEventKind>,
}

impl CircuitEventSubscription {
    /// Wait for the next matching event. Returns `None` once the registry is dropped.
    pub async fn recv(&mut self) -> Option<CircuitBreakerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Circuit event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting
    pub fn try_recv(&mut self) -> Option<CircuitBreakerEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Circuit event subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain every matching event currently buffered
    pub fn drain(&mut self) -> Vec<CircuitBreakerEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn matches(&self, event: &CircuitBreakerEvent) -> bool {
        self.filter.map_or(true, |kind| kind == event.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: CircuitEventKind) -> CircuitBreakerEvent {
        CircuitBreakerEvent {
            service_name: "payments".to_string(),
            kind,
            timestamp: Utc::now(),
            details: json!({}),
        }
    }

    #[test]
    fn test_filtered_subscription_skips_other_kinds() {
        let bus = EventBus::new(16);
        let mut all = bus.subscribe(None);
        let mut opened = bus.subscribe(Some(CircuitEventKind::Opened));

        bus.publish(event(CircuitEventKind::Failure));
        bus.publish(event(CircuitEventKind::Opened));

        assert_eq!(all.drain().len(), 2);
        let only = opened.drain();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].kind, CircuitEventKind::Opened);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        bus.publish(event(CircuitEventKind::Success));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serializes_with_api_field_names() {
        let json = serde_json::to_value(event(CircuitEventKind::HalfOpen)).unwrap();
        assert_eq!(json["serviceName"], "payments");
        assert_eq!(json["eventType"], "half_open");
    }
}

//! # Recovery Configuration
//!
//! Typed configuration for the circuit breaker registry, the breaker event
//! channel, the DLQ processor worker and its notification transport.
//!
//! ## Sources
//!
//! Later sources override earlier ones:
//!
//! 1. Built-in defaults (every section is `#[serde(default)]`)
//! 2. A TOML file, `config/conductor-recovery.toml` or `$CONDUCTOR_CONFIG_PATH`
//! 3. `CONDUCTOR_`-prefixed environment variables, with `__` between section and
//!    field, e.g. `CONDUCTOR_DLQ_PROCESSOR__POLLING_INTERVAL_MS=5000`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use conductor_recovery::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?;
//! println!("polling every {}ms", config.dlq_processor.polling_interval_ms);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

use crate::resilience::events::DEFAULT_EVENT_CAPACITY;
use crate::resilience::CircuitBreakerConfig;
use crate::worker::DlqProcessorConfig;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Defaults applied to breakers created on first report
    pub circuit_breaker: CircuitBreakerConfig,
    pub events: EventConfig,
    pub dlq_processor: DlqProcessorConfig,
    pub notifications: NotificationConfig,
}

impl RecoveryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.circuit_breaker
            .validate()
            .map_err(|e| ConfigurationError::validation_error("circuit_breaker", e))?;
        self.events.validate()?;
        self.dlq_processor
            .validate()
            .map_err(|e| ConfigurationError::validation_error("dlq_processor", e))?;
        self.notifications.validate()?;
        Ok(())
    }
}

/// Circuit breaker event channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Events buffered per subscriber before the slowest one starts lagging
    pub channel_capacity: usize,
}

impl EventConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTransport {
    /// Notifications disabled
    None,
    /// Render email-style alerts into the log
    #[default]
    Log,
    /// POST JSON payloads to `webhook_url`
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub transport: NotificationTransport,
    /// Recipient named in rendered log alerts
    pub recipient: String,
    pub webhook_url: Option<String>,
    /// Per-request HTTP timeout for the webhook transport
    pub webhook_timeout_ms: u64,
}

impl NotificationConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.transport == NotificationTransport::Webhook {
            match self.webhook_url.as_deref() {
                None => {
                    return Err(ConfigurationError::missing_required_field(
                        "webhook_url",
                        "notifications (transport = webhook)",
                    ))
                }
                Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                    return Err(ConfigurationError::invalid_value(
                        "notifications.webhook_url",
                        url,
                        "must be an http(s) URL",
                    ))
                }
                Some(_) => {}
            }
        }
        if self.webhook_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "notifications.webhook_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            transport: NotificationTransport::Log,
            recipient: "ops@localhost".to_string(),
            webhook_url: None,
            webhook_timeout_ms: 5_000,
        }
    }
}

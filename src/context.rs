//! # Recovery Context
//!
//! Owns the long-lived recovery components for one process: the circuit
//! breaker registry, the DLQ store and service, the clock and the configured
//! notification handler. Build it once at the entry point and hand out
//! `Arc`s; nothing in the crate relies on global singletons.

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigLoader, RecoveryConfig};
use crate::dlq::{DeadLetterQueueService, DeadLetterStore, InMemoryDeadLetterStore};
use crate::error::{RecoveryError, RecoveryResult};
use crate::notifications::{handler_from_config, NotificationHandler};
use crate::resilience::CircuitBreakerRegistry;
use crate::worker::DlqProcessorWorker;
use std::sync::Arc;
use tracing::info;

pub struct RecoveryContext {
    config: RecoveryConfig,
    clock: Arc<dyn Clock>,
    circuit_breakers: Arc<CircuitBreakerRegistry>,
    dlq_service: Arc<DeadLetterQueueService>,
    notification_handler: Option<Arc<dyn NotificationHandler>>,
}

impl std::fmt::Debug for RecoveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryContext")
            .field("clock", &self.clock)
            .field("circuit_breakers", &self.circuit_breakers.len())
            .field("dlq_service", &self.dlq_service)
            .field("notification_handler", &self.notification_handler)
            .finish()
    }
}

impl RecoveryContext {
    /// Wall-clock context over an in-memory DLQ store
    pub fn new(config: RecoveryConfig) -> RecoveryResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RecoveryConfig, clock: Arc<dyn Clock>) -> RecoveryResult<Self> {
        let store: Arc<dyn DeadLetterStore> = Arc::new(InMemoryDeadLetterStore::new(clock.clone()));
        Self::with_store(config, clock, store)
    }

    /// Context over a caller-supplied store
    pub fn with_store(
        config: RecoveryConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn DeadLetterStore>,
    ) -> RecoveryResult<Self> {
        config.validate()?;

        let notification_handler = handler_from_config(&config.notifications)
            .map_err(|e| RecoveryError::Configuration(e.to_string()))?;

        let circuit_breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breaker,
            clock.clone(),
            config.events.channel_capacity,
        ));
        let dlq_service = Arc::new(DeadLetterQueueService::new(store, clock.clone()));

        info!(
            transport = ?config.notifications.transport,
            event_capacity = config.events.channel_capacity,
            "Recovery context initialized"
        );

        Ok(Self {
            config,
            clock,
            circuit_breakers,
            dlq_service,
            notification_handler,
        })
    }

    /// Load configuration from file and environment, then build the context
    pub fn from_config() -> RecoveryResult<Self> {
        Self::new(ConfigLoader::load()?)
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.circuit_breakers
    }

    pub fn dlq_service(&self) -> &Arc<DeadLetterQueueService> {
        &self.dlq_service
    }

    pub fn notification_handler(&self) -> Option<&Arc<dyn NotificationHandler>> {
        self.notification_handler.as_ref()
    }

    /// A stopped worker over this context's DLQ service, with the configured handler installed
    pub fn dlq_processor(&self) -> DlqProcessorWorker {
        let worker = DlqProcessorWorker::new(
            self.dlq_service.clone(),
            self.clock.clone(),
            self.config.dlq_processor.clone(),
        );
        if let Some(handler) = &self.notification_handler {
            worker.set_notification_handler(handler.clone());
        }
        worker
    }
}

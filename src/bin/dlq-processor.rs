//! # DLQ Processor Server
//!
//! Standalone process running the dead-letter queue processor worker.
//!
//! ## Usage
//!
//! ```bash
//! # Run with defaults (plus config/conductor-recovery.toml if present)
//! cargo run --bin dlq-processor
//!
//! # Explicit config file and a faster sweep
//! CONDUCTOR_CONFIG_PATH=/etc/conductor/recovery.toml \
//! CONDUCTOR_DLQ_PROCESSOR__POLLING_INTERVAL_MS=5000 \
//!     cargo run --bin dlq-processor
//! ```

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use conductor_recovery::logging;
use conductor_recovery::RecoveryContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    info!("Starting DLQ processor");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let context = RecoveryContext::from_config().context("Failed to build recovery context")?;
    let config = context.config();
    info!(
        "   Polling interval: {}ms",
        config.dlq_processor.polling_interval_ms
    );
    info!(
        "   Retention: {} days, archive after: {} days, max retries: {}",
        config.dlq_processor.retention_days,
        config.dlq_processor.archive_after_days,
        config.dlq_processor.max_retry_limit
    );
    info!("   Notifications: {:?}", config.notifications.transport);

    let worker = context.dlq_processor();
    worker.start().await;

    info!("   Press Ctrl+C to shutdown gracefully");
    shutdown_signal().await?;

    info!("Shutdown signal received, waiting for in-flight sweep");
    worker.stop().await;

    let status = worker.get_status();
    info!(
        sweeps = status.stats.sweeps_completed,
        archived = status.stats.archived_entries,
        notifications_sent = status.stats.notifications_sent,
        "DLQ processor shutdown complete"
    );
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")
    };

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = ctrl_c => result?,
            _ = terminate.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await?;

    Ok(())
}

//! # DLQ Processor Worker
//!
//! Background sweep over the dead-letter queue. Each sweep runs four phases in
//! order:
//!
//! 1. **process_high_retry_entries**: resolve pending entries whose retry count
//!    reached `max_retry_limit`, sending an `archived` notification for each
//! 2. **archive_old_entries**: resolve pending entries older than `archive_after_days`
//! 3. **notify_unresolved**: send a `pending` notification for every pending
//!    entry added within the notification window (no deduplication across sweeps)
//! 4. **cleanup_old_entries**: purge resolved entries past `retention_days`
//!
//! A failing phase is logged and recorded in the [`SweepReport`]; later phases
//! still run. Per-entry failures never abort a phase.
//!
//! ## Scheduling
//!
//! `start()` runs one sweep immediately, then a spawned task waits
//! `polling_interval_ms` after each sweep *completes* before running the next,
//! so slow sweeps never overlap. `stop()` signals the task through a `watch`
//! channel and waits for it; an in-flight sweep always runs to completion.
//!
//! Auto-archival resolves with the entry version read during the scan, so an
//! entry resolved or resubmitted concurrently is skipped rather than overwritten.

use crate::clock::Clock;
use crate::dlq::{DeadLetterQueueService, DlqEntry, DlqStats, ResolutionSource};
use crate::error::{RecoveryError, RecoveryResult};
use crate::metrics::{dlq_notifications_total, dlq_sweep_duration};
use crate::notifications::{NotificationHandler, NotificationKind};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use opentelemetry::KeyValue;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Worker policy; every field has a default so partial TOML sections work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DlqProcessorConfig {
    /// Delay between the end of one sweep and the start of the next
    pub polling_interval_ms: u64,
    /// Resolved entries older than this are purged
    pub retention_days: u32,
    /// Pending entries with at least this many retries are auto-archived
    pub max_retry_limit: u32,
    pub notification_enabled: bool,
    /// Pending entries older than this are auto-archived
    pub archive_after_days: u32,
    /// Upper bound on a single notification send
    pub notification_timeout_ms: u64,
    pub high_retry_scan_limit: usize,
    pub archive_scan_limit: usize,
    pub notification_scan_limit: usize,
    /// Only entries younger than this receive `pending` notifications
    pub notification_window_hours: u32,
}

impl Default for DlqProcessorConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 30_000,
            retention_days: 90,
            max_retry_limit: 5,
            notification_enabled: true,
            archive_after_days: 30,
            notification_timeout_ms: 10_000,
            high_retry_scan_limit: 100,
            archive_scan_limit: 100,
            notification_scan_limit: 50,
            notification_window_hours: 24,
        }
    }
}

impl DlqProcessorConfig {
    pub fn validate(&self) -> Result<(), String> {
        let positive: [(&str, u64); 9] = [
            ("polling_interval_ms", self.polling_interval_ms),
            ("retention_days", u64::from(self.retention_days)),
            ("max_retry_limit", u64::from(self.max_retry_limit)),
            ("archive_after_days", u64::from(self.archive_after_days)),
            ("notification_timeout_ms", self.notification_timeout_ms),
            ("high_retry_scan_limit", self.high_retry_scan_limit as u64),
            ("archive_scan_limit", self.archive_scan_limit as u64),
            ("notification_scan_limit", self.notification_scan_limit as u64),
            ("notification_window_hours", u64::from(self.notification_window_hours)),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(format!("{field} must be greater than 0"));
            }
        }
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

/// Cumulative counters since construction or the last `reset_stats()`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    /// Pending entries examined by the retry-limit phase
    pub processed_entries: u64,
    pub archived_entries: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub cleanup_cycles: u64,
    pub sweeps_completed: u64,
    /// Duration of the most recent sweep
    pub last_processing_time_ms: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPhase {
    ProcessHighRetryEntries,
    ArchiveOldEntries,
    NotifyUnresolved,
    CleanupOldEntries,
}

impl SweepPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProcessHighRetryEntries => "process_high_retry_entries",
            Self::ArchiveOldEntries => "archive_old_entries",
            Self::NotifyUnresolved => "notify_unresolved",
            Self::CleanupOldEntries => "cleanup_old_entries",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseError {
    pub phase: SweepPhase,
    pub error: String,
}

/// Outcome of a single sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub examined_entries: usize,
    pub archived_retry_limit: usize,
    pub archived_aged: usize,
    pub notifications_sent: usize,
    pub notification_failures: usize,
    pub purged_entries: usize,
    pub duration_ms: u64,
    pub errors: Vec<PhaseError>,
}

impl SweepReport {
    pub fn archived(&self) -> usize {
        self.archived_retry_limit + self.archived_aged
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn did_work(&self) -> bool {
        self.archived() > 0
            || self.notifications_sent > 0
            || self.notification_failures > 0
            || self.purged_entries > 0
            || !self.errors.is_empty()
    }

    fn record_error(&mut self, phase: SweepPhase, err: RecoveryError) {
        error!(phase = phase.as_str(), error = %err, code = err.code(), "DLQ sweep phase failed");
        self.errors.push(PhaseError {
            phase,
            error: err.to_string(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub is_running: bool,
    pub config: DlqProcessorConfig,
    pub stats: WorkerStats,
}

/// Point-in-time view of the queue backlog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogReport {
    pub timestamp: DateTime<Utc>,
    pub stats: DlqStats,
    /// Size of the first page of pending entries, at most 10
    pub pending_count: usize,
    /// Size of the first page of failed entries, at most 10
    pub failed_count: usize,
    pub high_retry_entries: Vec<DlqEntry>,
    pub worker_stats: WorkerStats,
}

const BACKLOG_PAGE_SIZE: usize = 10;

struct ProcessorCore {
    service: Arc<DeadLetterQueueService>,
    clock: Arc<dyn Clock>,
    config: DlqProcessorConfig,
    stats: Mutex<WorkerStats>,
    handler: RwLock<Option<Arc<dyn NotificationHandler>>>,
}

struct SweepTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct DlqProcessorWorker {
    core: Arc<ProcessorCore>,
    running: AtomicBool,
    task: Mutex<Option<SweepTask>>,
}

impl std::fmt::Debug for DlqProcessorWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DlqProcessorWorker")
            .field("config", &self.core.config)
            .field("is_running", &self.running.load(Ordering::Relaxed))
            .field("has_notification_handler", &self.core.handler.read().is_some())
            .field("stats", &*self.core.stats.lock())
            .finish()
    }
}

impl DlqProcessorWorker {
    pub fn new(
        service: Arc<DeadLetterQueueService>,
        clock: Arc<dyn Clock>,
        config: DlqProcessorConfig,
    ) -> Self {
        Self {
            core: Arc::new(ProcessorCore {
                service,
                clock,
                config,
                stats: Mutex::new(WorkerStats::default()),
                handler: RwLock::new(None),
            }),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_notification_handler(self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.set_notification_handler(handler);
        self
    }

    /// Install or replace the notification handler; takes effect from the next phase
    pub fn set_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        debug!(handler = ?handler, "DLQ processor notification handler set");
        *self.core.handler.write() = Some(handler);
    }

    pub fn config(&self) -> &DlqProcessorConfig {
        &self.core.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one sweep now, then keep sweeping in the background until `stop()`
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("DLQ processor already running");
            return;
        }

        info!(
            polling_interval_ms = self.core.config.polling_interval_ms,
            max_retry_limit = self.core.config.max_retry_limit,
            archive_after_days = self.core.config.archive_after_days,
            retention_days = self.core.config.retention_days,
            "Starting DLQ processor"
        );

        self.core.run_sweep().await;

        // stop() clears `running` before taking the task slot, so checking it
        // under the slot lock means either stop() sees our task or we see stop()
        let mut task = self.task.lock();
        if !self.running.load(Ordering::SeqCst) {
            debug!("DLQ processor stopped during initial sweep");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let core = Arc::clone(&self.core);
        let handle = tokio::spawn(async move { core.sweep_loop(shutdown_rx).await });
        *task = Some(SweepTask { shutdown, handle });
    }

    /// Cancel scheduled sweeps and wait for an in-flight sweep to finish
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("DLQ processor not running");
            return;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                error!(error = %e, "DLQ processor task ended abnormally");
            }
        }

        info!("DLQ processor stopped");
    }

    /// Run a single sweep on the caller's task, independent of the schedule
    pub async fn run_sweep(&self) -> SweepReport {
        self.core.run_sweep().await
    }

    pub fn get_status(&self) -> WorkerStatus {
        WorkerStatus {
            is_running: self.is_running(),
            config: self.core.config.clone(),
            stats: self.core.stats.lock().clone(),
        }
    }

    pub async fn generate_backlog_report(&self) -> RecoveryResult<BacklogReport> {
        let service = &self.core.service;
        let stats = service.get_dlq_stats().await?;
        let pending = service.get_pending_entries(BACKLOG_PAGE_SIZE).await?;
        let failed = service.get_failed_entries(BACKLOG_PAGE_SIZE).await?;

        Ok(BacklogReport {
            timestamp: self.core.clock.now(),
            stats,
            pending_count: pending.len(),
            failed_count: failed.len(),
            high_retry_entries: failed,
            worker_stats: self.core.stats.lock().clone(),
        })
    }

    pub fn reset_stats(&self) {
        *self.core.stats.lock() = WorkerStats::default();
        debug!("DLQ processor stats reset");
    }
}

impl ProcessorCore {
    async fn sweep_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.polling_interval();

        loop {
            tokio::select! {
                biased;
                // Err means the worker was dropped without stop()
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                () = tokio::time::sleep(interval) => {
                    self.run_sweep().await;
                }
            }
        }

        debug!("DLQ processor sweep loop exited");
    }

    async fn run_sweep(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        if let Err(e) = self.process_high_retry_entries(&mut report).await {
            report.record_error(SweepPhase::ProcessHighRetryEntries, e);
        }
        if let Err(e) = self.archive_old_entries(&mut report).await {
            report.record_error(SweepPhase::ArchiveOldEntries, e);
        }
        if let Err(e) = self.notify_unresolved(&mut report).await {
            report.record_error(SweepPhase::NotifyUnresolved, e);
        }
        if let Err(e) = self.cleanup_old_entries(&mut report).await {
            report.record_error(SweepPhase::CleanupOldEntries, e);
        }

        let elapsed = started.elapsed();
        report.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        dlq_sweep_duration().record(elapsed.as_secs_f64() * 1000.0, &[]);

        {
            let mut stats = self.stats.lock();
            stats.sweeps_completed += 1;
            stats.last_processing_time_ms = report.duration_ms;
            stats.last_sweep_at = Some(self.clock.now());
        }

        if report.did_work() {
            info!(
                examined = report.examined_entries,
                archived = report.archived(),
                notifications_sent = report.notifications_sent,
                notification_failures = report.notification_failures,
                purged = report.purged_entries,
                errors = report.errors.len(),
                duration_ms = report.duration_ms,
                "DLQ sweep completed"
            );
        } else {
            debug!(
                examined = report.examined_entries,
                duration_ms = report.duration_ms,
                "DLQ sweep completed with nothing to do"
            );
        }
        report
    }

    async fn process_high_retry_entries(&self, report: &mut SweepReport) -> RecoveryResult<()> {
        let pending = self
            .service
            .get_pending_entries(self.config.high_retry_scan_limit)
            .await?;

        report.examined_entries = pending.len();
        self.stats.lock().processed_entries += pending.len() as u64;

        let limit = self.config.max_retry_limit;
        let notes = format!("Auto-archived: Exceeded {limit} retry limit");
        let handler = self.active_handler();

        for entry in pending.iter().filter(|e| e.retry_count >= limit) {
            if !self
                .archive(entry, &notes, ResolutionSource::AutoRetryLimit)
                .await
            {
                continue;
            }
            report.archived_retry_limit += 1;

            if let Some(handler) = &handler {
                self.notify(handler.as_ref(), entry, NotificationKind::Archived, report)
                    .await;
            }
        }
        Ok(())
    }

    async fn archive_old_entries(&self, report: &mut SweepReport) -> RecoveryResult<()> {
        let pending = self
            .service
            .get_pending_entries(self.config.archive_scan_limit)
            .await?;

        let days = self.config.archive_after_days;
        let cutoff = self.clock.now() - ChronoDuration::days(i64::from(days));
        let notes = format!("Auto-archived after {days} days without resolution");

        for entry in pending.iter().filter(|e| e.added_at < cutoff) {
            if self.archive(entry, &notes, ResolutionSource::AutoAge).await {
                report.archived_aged += 1;
            }
        }
        Ok(())
    }

    async fn notify_unresolved(&self, report: &mut SweepReport) -> RecoveryResult<()> {
        let Some(handler) = self.active_handler() else {
            return Ok(());
        };

        let pending = self
            .service
            .get_pending_entries(self.config.notification_scan_limit)
            .await?;

        let now = self.clock.now();
        let window = ChronoDuration::hours(i64::from(self.config.notification_window_hours));

        for entry in pending.iter().filter(|e| now - e.added_at < window) {
            self.notify(handler.as_ref(), entry, NotificationKind::Pending, report)
                .await;
        }
        Ok(())
    }

    async fn cleanup_old_entries(&self, report: &mut SweepReport) -> RecoveryResult<()> {
        report.purged_entries = self.service.cleanup_dlq(self.config.retention_days).await?;
        self.stats.lock().cleanup_cycles += 1;
        Ok(())
    }

    /// Resolve `entry` at the version it was read with. Returns whether this call resolved it.
    async fn archive(&self, entry: &DlqEntry, notes: &str, source: ResolutionSource) -> bool {
        match self
            .service
            .resolve_entry(&entry.id, notes, source, Some(entry.version))
            .await
        {
            Ok(_) => {
                self.stats.lock().archived_entries += 1;
                true
            }
            Err(RecoveryError::Conflict { .. } | RecoveryError::NotFound { .. }) => {
                debug!(dlq_id = %entry.id, "DLQ entry changed during sweep, skipping");
                false
            }
            Err(e) => {
                warn!(dlq_id = %entry.id, error = %e, "Failed to auto-archive DLQ entry");
                false
            }
        }
    }

    fn active_handler(&self) -> Option<Arc<dyn NotificationHandler>> {
        if !self.config.notification_enabled {
            return None;
        }
        self.handler.read().clone()
    }

    async fn notify(
        &self,
        handler: &dyn NotificationHandler,
        entry: &DlqEntry,
        kind: NotificationKind,
        report: &mut SweepReport,
    ) {
        let timeout_ms = self.config.notification_timeout_ms;
        let outcome = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            handler.send(entry, kind),
        )
        .await
        {
            Ok(Ok(())) => {
                self.stats.lock().notifications_sent += 1;
                report.notifications_sent += 1;
                "sent"
            }
            Ok(Err(e)) => {
                warn!(dlq_id = %entry.id, kind = kind.as_str(), error = %e, "DLQ notification failed");
                self.stats.lock().notification_failures += 1;
                report.notification_failures += 1;
                "failed"
            }
            Err(_) => {
                warn!(dlq_id = %entry.id, kind = kind.as_str(), timeout_ms, "DLQ notification timed out");
                self.stats.lock().notification_failures += 1;
                report.notification_failures += 1;
                "timeout"
            }
        };

        dlq_notifications_total().add(
            1,
            &[
                KeyValue::new("kind", kind.as_str()),
                KeyValue::new("outcome", outcome),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::dlq::{InMemoryDeadLetterStore, TaskFailure};
    use serde_json::json;

    fn worker(config: DlqProcessorConfig) -> (DlqProcessorWorker, Arc<DeadLetterQueueService>, Arc<MockClock>) {
        let clock = Arc::new(MockClock::starting_now());
        let store = Arc::new(InMemoryDeadLetterStore::new(clock.clone()));
        let service = Arc::new(DeadLetterQueueService::new(store, clock.clone()));
        (
            DlqProcessorWorker::new(service.clone(), clock.clone(), config),
            service,
            clock,
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(DlqProcessorConfig::default().validate().is_ok());

        let config = DlqProcessorConfig {
            archive_after_days: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "archive_after_days must be greater than 0"
        );
    }

    #[tokio::test]
    async fn test_empty_queue_sweep() {
        let (worker, _, _) = worker(DlqProcessorConfig::default());
        let report = worker.run_sweep().await;

        assert!(report.is_clean());
        assert_eq!(report.archived(), 0);

        let stats = worker.get_status().stats;
        assert_eq!(stats.sweeps_completed, 1);
        assert_eq!(stats.cleanup_cycles, 1);
        assert!(stats.last_sweep_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_resolution_is_not_overwritten() {
        let (worker, service, _) = worker(DlqProcessorConfig::default());
        let entry = service
            .add_to_dlq("task-1", json!({}), TaskFailure::new("boom"), 9)
            .await
            .unwrap();
        service.resolve_dlq_entry(&entry.id, "fixed by hand").await.unwrap();

        assert!(
            !worker
                .core
                .archive(&entry, "Auto-archived", ResolutionSource::AutoRetryLimit)
                .await
        );
        let current = service.get_dlq_entry(&entry.id).await.unwrap();
        assert_eq!(current.resolution_notes.as_deref(), Some("fixed by hand"));
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let (worker, _, _) = worker(DlqProcessorConfig::default());
        worker.run_sweep().await;
        worker.reset_stats();
        assert_eq!(worker.get_status().stats, WorkerStats::default());
    }
}

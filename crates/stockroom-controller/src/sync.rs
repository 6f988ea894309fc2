//! Background sync engine.
//!
//! Drains the durable queue into the [`Uploader`]. Work is claimed in
//! batches; within a session the store only hands out the lowest
//! unconfirmed `seq`, so one session's uploads reach the server in order
//! while different sessions interleave freely.
//!
//! Outcomes map onto the queue as follows:
//!
//! | Upload result | Queue outcome                                   |
//! |---------------|-------------------------------------------------|
//! | `Ok`          | `Confirmed`                                     |
//! | `Transient`   | `Retry`, due after the jittered backoff delay   |
//! | `Permanent`   | `Failed`, left for an operator                  |
//!
//! The engine never blocks the session pipeline: sessions only enqueue and
//! nudge the engine through a shared [`Notify`].

use crate::backoff::{RetryPolicy, SyncClock};
use crate::config::SyncConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use stockroom_core::Result;
use stockroom_network::{AnyUploader, UploadError, Uploader};
use stockroom_storage::{DurableStore, SqliteStore, SyncOutcome, SyncQueueEntry};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Running totals since startup.
#[derive(Debug, Default)]
pub struct SyncStats {
    attempts: AtomicU64,
    confirmed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    last_confirmed_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatsSnapshot {
    pub attempts: u64,
    pub confirmed: u64,
    pub retried: u64,
    pub failed: u64,
    pub last_confirmed_at: Option<DateTime<Utc>>,
}

impl SyncStats {
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_confirmed_at: self
                .last_confirmed_at
                .lock()
                .map(|guard| *guard)
                .unwrap_or(None),
        }
    }

    fn record_confirmed(&self, at: DateTime<Utc>) {
        self.confirmed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_confirmed_at.lock() {
            *guard = Some(at);
        }
    }
}

/// What one drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub claimed: usize,
    pub confirmed: usize,
    pub retried: usize,
    pub failed: usize,
}

pub struct SyncEngine {
    store: SqliteStore,
    uploader: AnyUploader,
    policy: RetryPolicy,
    config: SyncConfig,
    clock: SyncClock,
    wake: Arc<Notify>,
    stats: Arc<SyncStats>,
}

impl SyncEngine {
    pub fn new(store: SqliteStore, uploader: impl Into<AnyUploader>, config: SyncConfig) -> Self {
        Self {
            store,
            uploader: uploader.into(),
            policy: RetryPolicy::from_config(&config),
            config,
            clock: SyncClock::new(),
            wake: Arc::new(Notify::new()),
            stats: Arc::new(SyncStats::default()),
        }
    }

    /// Share `wake` with the session runner.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = wake;
        self
    }

    pub fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub fn stats(&self) -> Arc<SyncStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first store failure. Upload failures are recorded on the
    /// queue and never end the loop.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Sync engine started"
        );

        while !shutdown.is_cancelled() {
            let report = self.drain(&shutdown).await?;

            // Confirmations may have unblocked the next seq of a session.
            if report.confirmed > 0 {
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.wake.notified() => debug!("Sync engine woken"),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Sync engine stopped");
        Ok(())
    }

    /// Claim and upload one batch of due entries.
    ///
    /// If `shutdown` fires mid-upload the entry is left in flight; the
    /// supervisor requeues it before closing the store.
    pub async fn drain(&self, shutdown: &CancellationToken) -> Result<DrainReport> {
        let entries = self
            .store
            .dequeue_ready_sync(self.clock.now(), self.config.batch_size)
            .await?;

        let mut report = DrainReport {
            claimed: entries.len(),
            ..DrainReport::default()
        };
        if entries.is_empty() {
            return Ok(report);
        }
        debug!(claimed = entries.len(), "Sync batch claimed");

        for entry in entries {
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(upload_id = %entry.upload_id, "Upload interrupted by shutdown");
                    break;
                }
                result = self.uploader.upload(&entry.payload) => result,
            };

            let outcome = self.outcome_for(&entry, result);
            match &outcome {
                SyncOutcome::Confirmed => report.confirmed += 1,
                SyncOutcome::Retry { .. } => report.retried += 1,
                SyncOutcome::Failed { .. } => report.failed += 1,
            }
            self.store.mark_sync_result(entry.entry_id, outcome).await?;
        }

        Ok(report)
    }

    fn outcome_for(
        &self,
        entry: &SyncQueueEntry,
        result: std::result::Result<(), UploadError>,
    ) -> SyncOutcome {
        let attempt = entry.attempt_count + 1;
        match result {
            Ok(()) => {
                self.stats.record_confirmed(self.clock.now());
                info!(
                    upload_id = %entry.upload_id,
                    session_id = %entry.session_id,
                    attempt,
                    "Upload confirmed"
                );
                SyncOutcome::Confirmed
            }
            Err(UploadError::Transient(message)) => {
                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                let delay = self.policy.delay(attempt);
                warn!(
                    upload_id = %entry.upload_id,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %message,
                    "Upload failed, will retry"
                );
                SyncOutcome::Retry {
                    next_attempt_at: self.clock.after(delay),
                    error: message,
                }
            }
            Err(UploadError::Permanent(message)) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    upload_id = %entry.upload_id,
                    session_id = %entry.session_id,
                    error = %message,
                    "Upload rejected, manual review required"
                );
                SyncOutcome::Failed { error: message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stockroom_core::{CardId, Session, SyncStatus};
    use stockroom_network::{MockResponse, MockUploader};
    use stockroom_storage::{Database, NewSyncEntry};

    async fn store_with_session() -> (SqliteStore, Session) {
        let store = SqliteStore::new(Database::in_memory().await.unwrap());
        let session = Session::start(CardId::new("04ABCDEF").unwrap());
        store.append_session(&session).await.unwrap();
        store
            .enqueue_sync(&NewSyncEntry::plan(&session, &[], 10))
            .await
            .unwrap();
        (store, session)
    }

    fn config() -> SyncConfig {
        SyncConfig::default()
            .poll_interval(Duration::from_millis(10))
            .backoff(Duration::from_secs(1), Duration::from_secs(60))
            .jitter_ratio(0.0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_confirms_entry() {
        let (store, session) = store_with_session().await;
        let uploader = MockUploader::new();
        let engine = SyncEngine::new(store.clone(), uploader.clone(), config());

        let report = engine.drain(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.confirmed, 1);
        assert_eq!(uploader.applied_count(), 1);

        let stored = store.find_session(session.session_id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Confirmed);
        assert_eq!(engine.stats().snapshot().confirmed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_schedules_retry() {
        let (store, _) = store_with_session().await;
        let uploader = MockUploader::new();
        uploader.push_response(MockResponse::Transient("503".into()));
        let engine = SyncEngine::new(store.clone(), uploader.clone(), config());

        let report = engine.drain(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.retried, 1);

        // Not due yet.
        let report = engine.drain(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.claimed, 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        let report = engine.drain(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.confirmed, 1);
        assert_eq!(uploader.attempt_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let (store, session) = store_with_session().await;
        let uploader = MockUploader::new();
        uploader.push_response(MockResponse::Permanent("400 Bad Request".into()));
        let engine = SyncEngine::new(store.clone(), uploader.clone(), config());

        let report = engine.drain(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.failed, 1);

        tokio::time::advance(Duration::from_secs(3600)).await;
        let report = engine.drain(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.claimed, 0);

        let stored = store.find_session(session.session_id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::FailedPermanent);
        assert_eq!(store.failed_permanent_entries().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_drain_leaves_entry_in_flight() {
        let (store, _) = store_with_session().await;
        let engine = SyncEngine::new(store.clone(), MockUploader::new(), config());

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let report = engine.drain(&shutdown).await.unwrap();

        assert_eq!(report.claimed, 1);
        assert_eq!(report.confirmed, 0);
        assert_eq!(store.sync_counts().await.unwrap().in_flight, 1);
        assert_eq!(store.requeue_in_flight().await.unwrap(), 1);

        // An interrupted upload is not a spent attempt.
        let requeued = store.dequeue_ready_sync(engine.clock.now(), 10).await.unwrap();
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_enqueued_after_clock_advanced_is_due_at_once() {
        let store = SqliteStore::new(Database::in_memory().await.unwrap());
        let uploader = MockUploader::new();
        let engine = SyncEngine::new(store.clone(), uploader.clone(), config());

        // The engine clock now runs an hour ahead of the wall clock.
        tokio::time::advance(Duration::from_secs(3600)).await;
        let session = Session::start(CardId::new("04ABCDEF").unwrap());
        store.append_session(&session).await.unwrap();
        store
            .enqueue_sync(&NewSyncEntry::plan(&session, &[], 10))
            .await
            .unwrap();

        let report = engine.drain(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.confirmed, 1);
        assert!(uploader.has_applied(&session.session_id.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let (store, _) = store_with_session().await;
        let uploader = MockUploader::new();
        let engine = SyncEngine::new(store.clone(), uploader.clone(), config());
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(engine.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(uploader.applied_count(), 1);
    }
}

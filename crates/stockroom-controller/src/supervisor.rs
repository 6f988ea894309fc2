//! Process-level lifecycle: startup recovery, task wiring, fault escalation
//! and graceful shutdown.
//!
//! ```text
//!                  ┌──────────────┐  try_lock   ┌───────────────┐
//! card reader ───► │  dispatcher  │ ──────────► │ SessionRunner │──┐
//!   (events)       └──────────────┘  (busy →    └───────────────┘  │ enqueue
//!                                     ignore)                      ▼ + notify
//!                                                  ┌──────────────────────┐
//!                                                  │ SyncEngine ─► server │
//!                                                  └──────────────────────┘
//! ```
//!
//! A fatal error from either task (a failed durable write) is published on
//! a watch channel. From then on cards are ignored and the binary is
//! expected to shut down and exit non-zero.

use crate::config::ControllerConfig;
use crate::session::{SessionOutcome, SessionRunner};
use crate::sync::{SyncEngine, SyncStats, SyncStatsSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stockroom_core::Result;
use stockroom_hardware::{
    AnyCardReader, AnyDoorLock, AnyScanner, DoorLock, InventoryScanner, PeripheralConfig,
    PeripheralEvent, PeripheralHandle, PeripheralManager,
};
use stockroom_network::AnyUploader;
use stockroom_storage::{DurableStore, SqliteStore, SyncCounts};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type FaultSender = Arc<watch::Sender<Option<String>>>;

/// The devices guarding one inventory room.
pub struct Peripherals {
    pub card_reader: AnyCardReader,
    pub door: AnyDoorLock,
    pub scanner: AnyScanner,
}

/// Snapshot served by the admin status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub running: bool,
    pub session_active: bool,
    pub fault: Option<String>,
    pub sync: SyncCounts,
    pub sync_stats: SyncStatsSnapshot,
    pub sessions_needing_review: usize,
}

/// Read-only view of a running controller. Cheap to clone.
#[derive(Clone)]
pub struct StatusReader {
    store: SqliteStore,
    runner: Arc<Mutex<SessionRunner>>,
    stats: Arc<SyncStats>,
    faults: watch::Receiver<Option<String>>,
    running: Arc<AtomicBool>,
}

impl StatusReader {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn fault(&self) -> Option<String> {
        self.faults.borrow().clone()
    }

    pub async fn status(&self) -> Result<ControllerStatus> {
        Ok(ControllerStatus {
            running: self.is_running(),
            session_active: self.runner.try_lock().is_err(),
            fault: self.fault(),
            sync: self.store.sync_counts().await?,
            sync_stats: self.stats.snapshot(),
            sessions_needing_review: self.store.sessions_needing_review().await?.len(),
        })
    }
}

pub struct Supervisor;

impl Supervisor {
    /// Recover, then start accepting cards.
    ///
    /// In-flight uploads left by a previous process go back to pending and
    /// any active session is driven to completion before the card reader is
    /// started.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or a store failure during recovery.
    pub async fn start(
        config: ControllerConfig,
        store: SqliteStore,
        peripherals: Peripherals,
        uploader: impl Into<AnyUploader>,
    ) -> Result<SupervisorHandle> {
        config.validate()?;

        let requeued = store.requeue_in_flight().await?;
        if requeued > 0 {
            warn!(requeued, "Uploads interrupted by the previous run were requeued");
        }

        let (fault_tx, faults) = watch::channel(None);
        let fault_tx: FaultSender = Arc::new(fault_tx);

        let engine = SyncEngine::new(store.clone(), uploader, config.sync.clone());
        let wake = engine.wake_handle();
        let stats = engine.stats();
        let sync_shutdown = CancellationToken::new();
        let sync_task = tokio::spawn(Self::run_sync(
            engine,
            sync_shutdown.clone(),
            Arc::clone(&fault_tx),
        ));

        match peripherals.door.get_info().await {
            Ok(door) => info!(%door, "Door lock ready"),
            Err(e) => warn!(error = %e, "Door lock did not identify itself"),
        }
        match peripherals.scanner.get_info().await {
            Ok(scanner) => info!(%scanner, "Inventory scanner ready"),
            Err(e) => warn!(error = %e, "Inventory scanner did not identify itself"),
        }

        let mut runner = SessionRunner::new(
            store.clone(),
            peripherals.door,
            peripherals.scanner,
            config.clone(),
        )
        .with_sync_wake(wake);

        match runner.recover().await {
            Ok(recovered) if !recovered.is_empty() => {
                info!(count = recovered.len(), "Interrupted sessions recovered");
            }
            Ok(_) => debug!("No interrupted session found"),
            Err(e) => {
                sync_shutdown.cancel();
                let _ = sync_task.await;
                return Err(e);
            }
        }

        let runner = Arc::new(Mutex::new(runner));

        let mut manager = PeripheralManager::new(PeripheralConfig::default());
        manager.register_card_reader(peripherals.card_reader);
        let events = manager.start();

        let dispatch_shutdown = CancellationToken::new();
        let dispatcher = tokio::spawn(Self::dispatch(
            events,
            Arc::clone(&runner),
            Arc::clone(&fault_tx),
            dispatch_shutdown.clone(),
        ));

        let running = Arc::new(AtomicBool::new(true));
        info!("Controller started");

        Ok(SupervisorHandle {
            status_reader: StatusReader {
                store: store.clone(),
                runner: Arc::clone(&runner),
                stats,
                faults,
                running: Arc::clone(&running),
            },
            store,
            runner,
            config,
            running,
            dispatch_shutdown,
            dispatcher,
            sync_shutdown,
            sync_task,
        })
    }

    async fn run_sync(
        engine: SyncEngine,
        shutdown: CancellationToken,
        faults: FaultSender,
    ) -> Result<()> {
        let result = engine.run(shutdown).await;
        if let Err(e) = &result {
            error!(error = %e, "Sync engine failed");
            faults.send_replace(Some(e.to_string()));
        }
        result
    }

    async fn dispatch(
        mut events: PeripheralHandle,
        runner: Arc<Mutex<SessionRunner>>,
        faults: FaultSender,
        shutdown: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(PeripheralEvent::CardPresented(card)) => {
                    if let Some(fault) = faults.borrow().as_deref() {
                        warn!(card = %card.uid_hex(), %fault, "Controller faulted, card ignored");
                        continue;
                    }

                    let Ok(mut guard) = Arc::clone(&runner).try_lock_owned() else {
                        info!(card = %card.uid_hex(), "Session in progress, card ignored");
                        continue;
                    };

                    let faults = Arc::clone(&faults);
                    tokio::spawn(async move {
                        match guard.handle_card(&card).await {
                            Ok(SessionOutcome::Denied { card_id, reason }) => {
                                info!(%card_id, %reason, "Access denied");
                            }
                            Ok(outcome) => debug!(?outcome, "Session finished"),
                            Err(e) if e.is_fatal() => {
                                error!(error = %e, "Fatal storage failure, controller faulted");
                                faults.send_replace(Some(e.to_string()));
                            }
                            Err(e) => warn!(error = %e, "Session aborted"),
                        }
                    });
                }
                Some(PeripheralEvent::DeviceError { device, error }) => {
                    error!(%device, %error, "Peripheral stopped");
                }
                Some(other) => debug!(?other, "Unhandled peripheral event"),
                None => {
                    warn!("All peripheral tasks ended, no further cards will be read");
                    shutdown.cancelled().await;
                    break;
                }
            }
        }

        if let Err(e) = events.shutdown().await {
            warn!(error = %e, "Peripheral shutdown failed");
        }
    }
}

/// Owns the running controller tasks.
pub struct SupervisorHandle {
    status_reader: StatusReader,
    store: SqliteStore,
    runner: Arc<Mutex<SessionRunner>>,
    config: ControllerConfig,
    running: Arc<AtomicBool>,
    dispatch_shutdown: CancellationToken,
    dispatcher: JoinHandle<()>,
    sync_shutdown: CancellationToken,
    sync_task: JoinHandle<Result<()>>,
}

impl SupervisorHandle {
    pub fn status_reader(&self) -> StatusReader {
        self.status_reader.clone()
    }

    pub fn faulted(&self) -> Option<String> {
        self.status_reader.fault()
    }

    /// Resolves when a fatal error is published.
    pub fn fault_receiver(&self) -> watch::Receiver<Option<String>> {
        self.status_reader.faults.clone()
    }

    pub async fn status(&self) -> Result<ControllerStatus> {
        self.status_reader.status().await
    }

    /// Stop accepting cards, let an in-flight session finish within the
    /// grace period, stop the sync engine and close the store.
    ///
    /// Uploads still in flight are returned to pending so the next start
    /// resends them under the same `upload_id`.
    pub async fn shutdown(self) -> Result<()> {
        info!("Controller shutting down");
        self.running.store(false, Ordering::SeqCst);

        self.dispatch_shutdown.cancel();
        if let Err(e) = self.dispatcher.await {
            warn!(error = %e, "Dispatcher task failed");
        }

        let grace = self.config.shutdown_grace;
        match tokio::time::timeout(grace, self.runner.lock()).await {
            Ok(_idle) => debug!("No session in flight"),
            Err(_) => warn!(
                grace_secs = grace.as_secs(),
                "Session still running after grace period, it resumes on next start"
            ),
        }

        self.sync_shutdown.cancel();
        match self.sync_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Sync engine ended with an error"),
            Err(e) => warn!(error = %e, "Sync engine task failed"),
        }

        let requeued = self.store.requeue_in_flight().await?;
        if requeued > 0 {
            info!(requeued, "In-flight uploads returned to pending");
        }

        self.store.close().await;
        info!("Controller stopped");
        Ok(())
    }
}

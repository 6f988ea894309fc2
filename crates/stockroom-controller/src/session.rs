//! The session pipeline: one physical visit from card tap to queued upload.
//!
//! ```text
//! IDLE ─card─> AUTH ─grant─> SESSION_START ─before-scan─> MONITOR
//!                │                                           │
//!              deny                                close or timeout
//!                │                                           ▼
//!                └──> IDLE <── SYNC <──after-scan, diff── PROCESSING
//! ```
//!
//! Every transition is committed to the durable store before its
//! consequences happen: the session row exists before the door unlocks,
//! and the change records are queued before the next card is accepted.
//! Hardware waits are always bounded, so a broken sensor or scanner
//! degrades a session into an anomalous one instead of hanging it. A
//! snapshot that could not be captured is never diffed: the session is
//! held for review instead of reporting the whole room as changed.

use crate::config::ControllerConfig;
use crate::state_machine::StateMachine;
use chrono::Utc;
use std::sync::Arc;
use stockroom_core::{
    Error, InventoryItemRecord, Result, Session, SessionId, SessionState, SnapshotSide,
    SyncStatus, diff_snapshots,
};
use stockroom_hardware::{AnyDoorLock, AnyScanner, CardData, DoorLock, InventoryScanner};
use stockroom_storage::{
    DenyReason, DurableStore, LocalCardValidator, NewSyncEntry, SessionUpdate, SqliteStore,
    ValidationOutcome,
};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Anomaly recorded on sessions resumed at startup.
pub const RECOVERY_ANOMALY: &str = "recovered after restart";

/// How a card presentation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The card was refused; no session exists.
    Denied { card_id: String, reason: DenyReason },

    /// The visit was recorded and its changes queued for upload.
    Completed {
        session_id: SessionId,
        changes: usize,
        anomalous: bool,
    },

    /// A snapshot was missing or the diff failed. Nothing was queued; the
    /// session awaits an operator.
    NeedsReview { session_id: SessionId, marker: String },
}

impl SessionOutcome {
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            SessionOutcome::Denied { .. } => None,
            SessionOutcome::Completed { session_id, .. }
            | SessionOutcome::NeedsReview { session_id, .. } => Some(*session_id),
        }
    }
}

/// Drives the door and scanner through one session at a time.
///
/// The runner owns the request/response peripherals. The supervisor keeps
/// it behind a mutex; holding the lock is what "a session is active" means.
pub struct SessionRunner {
    store: SqliteStore,
    validator: LocalCardValidator,
    door: AnyDoorLock,
    scanner: AnyScanner,
    machine: StateMachine,
    config: ControllerConfig,
    sync_wake: Arc<Notify>,
    /// Set between a successful unlock and the relock that ends MONITOR.
    door_unlocked: bool,
}

impl SessionRunner {
    pub fn new(
        store: SqliteStore,
        door: AnyDoorLock,
        scanner: AnyScanner,
        config: ControllerConfig,
    ) -> Self {
        let validator = LocalCardValidator::new(store.pool().clone());
        Self {
            store,
            validator,
            door,
            scanner,
            machine: StateMachine::new(),
            config,
            sync_wake: Arc::new(Notify::new()),
            door_unlocked: false,
        }
    }

    /// Signal `wake` whenever a session's uploads are queued.
    pub fn with_sync_wake(mut self, wake: Arc<Notify>) -> Self {
        self.sync_wake = wake;
        self
    }

    pub fn state(&self) -> SessionState {
        *self.machine.current_state()
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Run one card presentation to completion.
    ///
    /// # Errors
    ///
    /// Hardware trouble never surfaces here; it is recorded on the session
    /// as an anomaly. Errors are storage failures (`StoreWriteFailure`,
    /// fatal) or a call made while a session is already in progress. A door
    /// unlocked by this call is relocked before an error is returned.
    pub async fn handle_card(&mut self, card: &CardData) -> Result<SessionOutcome> {
        let result = self.run_card(card).await;
        self.settle(result).await
    }

    /// Resume sessions a crash left active.
    ///
    /// A session interrupted in SESSION_START continues at the before-scan
    /// without unlocking again; MONITOR waits for close or timeout;
    /// PROCESSING captures the after-scan again. Each is flagged anomalous.
    pub async fn recover(&mut self) -> Result<Vec<SessionOutcome>> {
        if self.machine.is_busy() {
            return Err(Error::InvalidStateTransition {
                from: self.machine.current_state().to_string(),
                to: "recovery".to_string(),
            });
        }

        let mut outcomes = Vec::new();
        while let Some(session) = self.store.find_active_session().await? {
            warn!(
                session_id = %session.session_id,
                state = %session.state,
                "Resuming session interrupted by restart"
            );

            // The crash may have left the door open.
            self.door_unlocked =
                session.door_opened_at.is_some() && session.door_closed_at.is_none();
            let result = self.resume(session).await;
            outcomes.push(self.settle(result).await?);
        }

        Ok(outcomes)
    }

    async fn resume(&mut self, mut session: Session) -> Result<SessionOutcome> {
        self.persist(&mut session, SessionUpdate::new().anomaly(RECOVERY_ANOMALY))
            .await?;
        self.machine = StateMachine::builder()
            .with_initial_state(session.state)
            .build();

        self.drive(session).await
    }

    /// Pass `result` through; on error, relock a door this runner left
    /// unlocked and return the machine to IDLE.
    async fn settle(&mut self, result: Result<SessionOutcome>) -> Result<SessionOutcome> {
        if let Err(e) = &result {
            error!(error = %e, state = %self.machine.current_state(), "Session pipeline aborted");

            if self.door_unlocked {
                match self.door.lock().await {
                    Ok(()) => warn!("Door relocked after aborted session"),
                    Err(lock_err) => {
                        error!(error = %lock_err, "Door relock after aborted session failed")
                    }
                }
                self.door_unlocked = false;
            }
            self.machine.reset();
        }
        result
    }

    async fn run_card(&mut self, card: &CardData) -> Result<SessionOutcome> {
        self.machine.transition_to(SessionState::Auth)?;

        let card_id = match self.validator.validate(&card.uid_hex()).await? {
            ValidationOutcome::Granted {
                card_id,
                holder_name,
            } => {
                debug!(card_id = %card_id, holder = %holder_name, "Card accepted");
                card_id
            }
            ValidationOutcome::Denied { card_id, reason } => {
                self.machine.transition_to(SessionState::Idle)?;
                return Ok(SessionOutcome::Denied { card_id, reason });
            }
        };

        // The row must exist before the door opens.
        let mut session = Session::start(card_id);
        self.store.append_session(&session).await?;
        self.validator
            .log_granted(&session.card_id, session.session_id)
            .await?;
        self.machine.transition_to(SessionState::SessionStart)?;
        info!(session_id = %session.session_id, card_id = %session.card_id, "Session started");

        let update = match self.door.unlock().await {
            Ok(()) => {
                self.door_unlocked = true;
                SessionUpdate::new().door_opened_at(Utc::now())
            }
            Err(e) => {
                error!(session_id = %session.session_id, error = %e, "Door unlock failed");
                SessionUpdate::new().anomaly(format!("door unlock failed: {e}"))
            }
        };
        self.persist(&mut session, update).await?;

        self.drive(session).await
    }

    /// Continue a persisted session from its current state.
    async fn drive(&mut self, mut session: Session) -> Result<SessionOutcome> {
        if session.state == SessionState::SessionStart {
            let update = SessionUpdate::new().state(SessionState::Monitor);
            let update = match self.capture(SnapshotSide::Before).await {
                Ok(before) => update.before_snapshot(before),
                // Marked now so a restart cannot lose the hold.
                Err(reason) => update
                    .before_snapshot(Vec::new())
                    .anomaly(reason.clone())
                    .error_marker(reason),
            };
            self.persist(&mut session, update).await?;
            self.machine.transition_to(SessionState::Monitor)?;
        }

        if session.state == SessionState::Monitor {
            let anomalies = self.await_door_close(&session).await;
            let mut update = SessionUpdate::new()
                .state(SessionState::Processing)
                .door_closed_at(Utc::now());
            if !anomalies.is_empty() {
                update = update.anomaly(anomalies.join("; "));
            }
            self.persist(&mut session, update).await?;
            self.machine.transition_to(SessionState::Processing)?;
        }

        self.process(session).await
    }

    async fn process(&mut self, mut session: Session) -> Result<SessionOutcome> {
        let session_id = session.session_id;
        let update = SessionUpdate::new().state(SessionState::Sync);

        let (update, diff) = match self.capture(SnapshotSide::After).await {
            Ok(after) => {
                let diff = match &session.error_marker {
                    Some(marker) => Err(marker.clone()),
                    None => diff_snapshots(session_id, &session.before_snapshot, &after)
                        .map_err(|e| e.to_string()),
                };
                (update.after_snapshot(after), diff)
            }
            Err(reason) => (
                update.after_snapshot(Vec::new()).anomaly(reason.clone()),
                Err(reason),
            ),
        };

        let outcome = match diff {
            Ok(changes) => {
                update.apply_to(&mut session);
                let entries =
                    NewSyncEntry::plan(&session, &changes, self.config.changes_per_upload);
                self.store
                    .complete_processing(session_id, update, &changes, &entries)
                    .await?;

                info!(
                    %session_id,
                    changes = changes.len(),
                    uploads = entries.len(),
                    anomalous = session.anomalous,
                    "Session queued for sync"
                );
                SessionOutcome::Completed {
                    session_id,
                    changes: changes.len(),
                    anomalous: session.anomalous,
                }
            }
            Err(marker) => {
                error!(
                    %session_id,
                    error = %marker,
                    "Snapshots not comparable, session held for review"
                );

                let update = update
                    .sync_status(SyncStatus::FailedPermanent)
                    .error_marker(marker.clone());
                self.store
                    .complete_processing(session_id, update, &[], &[])
                    .await?;
                SessionOutcome::NeedsReview { session_id, marker }
            }
        };

        self.machine.transition_to(SessionState::Sync)?;
        self.sync_wake.notify_one();
        self.machine.transition_to(SessionState::Idle)?;
        Ok(outcome)
    }

    /// Capture one snapshot, retrying a bounded number of times.
    ///
    /// Returns the failure reason once every attempt has failed.
    async fn capture(
        &mut self,
        side: SnapshotSide,
    ) -> std::result::Result<Vec<InventoryItemRecord>, String> {
        let attempts = self.config.scan_attempts;
        let timeout = self.config.scan_timeout;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(timeout, self.scanner.capture_scan()).await {
                Ok(Ok(records)) => {
                    debug!(%side, items = records.len(), attempt, "Scan captured");
                    return Ok(records);
                }
                Ok(Err(e)) => {
                    warn!(%side, attempt, error = %e, "Scan capture failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    let e = Error::HardwareTimeout {
                        operation: format!("{side}-scan"),
                        duration_ms: timeout.as_millis() as u64,
                    };
                    warn!(%side, attempt, error = %e, "Scan capture timed out");
                    last_error = e.to_string();
                }
            }
        }

        error!(%side, attempts, "Scan unavailable, session will be held for review");
        Err(format!("{side}-scan failed after {attempts} attempts: {last_error}"))
    }

    /// Wait for the door to close, never longer than the open timeout, then
    /// relock. Returns anomaly reasons.
    async fn await_door_close(&mut self, session: &Session) -> Vec<String> {
        let mut anomalies = Vec::new();

        if session.door_opened_at.is_none() {
            debug!(session_id = %session.session_id, "Door never opened, skipping close wait");
        } else {
            let timeout = self.config.door_open_timeout;
            let deadline = Instant::now() + timeout;

            match tokio::time::timeout_at(deadline, self.door.wait_closed()).await {
                Ok(Ok(())) => debug!(session_id = %session.session_id, "Door closed"),
                Ok(Err(e)) => {
                    warn!(
                        session_id = %session.session_id,
                        error = %e,
                        "Door sensor failed, waiting out the open timeout"
                    );
                    tokio::time::sleep_until(deadline).await;
                    anomalies.push(format!("door sensor failed: {e}"));
                }
                Err(_) => {
                    let e = Error::HardwareTimeout {
                        operation: "door close".to_string(),
                        duration_ms: timeout.as_millis() as u64,
                    };
                    warn!(session_id = %session.session_id, error = %e, "Door left open");
                    anomalies.push(e.to_string());
                }
            }
        }

        if let Err(e) = self.door.lock().await {
            error!(session_id = %session.session_id, error = %e, "Door relock failed");
            anomalies.push(format!("door relock failed: {e}"));
        }
        self.door_unlocked = false;

        anomalies
    }

    /// Commit `update`, then mirror it on the in-memory session.
    async fn persist(&self, session: &mut Session, update: SessionUpdate) -> Result<()> {
        self.store
            .update_session(session.session_id, update.clone())
            .await?;
        update.apply_to(session);
        Ok(())
    }
}

//! The durable store: the single owner of persisted controller state.
//!
//! Every write is one SQLite transaction committed with `synchronous = FULL`,
//! so a call that returns `Ok` has reached stable storage. The session
//! pipeline commits each state transition here before acting on it.

#![allow(async_fn_in_trait)]

use crate::connection::{Database, DatabaseConfig};
use crate::error::StorageResult;
use crate::models::{NewSyncEntry, SessionUpdate, SyncCounts, SyncOutcome, SyncQueueEntry};
use crate::repositories::{
    SessionRepository, SqliteSessionRepository, SqliteSyncQueueRepository, SyncQueueRepository,
};
use crate::transaction;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use stockroom_core::{ChangeRecord, Session, SessionId};
use tracing::{debug, info, warn};

/// Contract between the controller and its local source of truth.
pub trait DurableStore: Send + Sync {
    /// Persist a freshly authorized session.
    async fn append_session(&self, session: &Session) -> StorageResult<SessionId>;

    /// Apply a partial update. Confirmed sessions are read-only.
    async fn update_session(&self, session_id: SessionId, update: SessionUpdate)
    -> StorageResult<()>;

    /// Append upload work to the queue.
    async fn enqueue_sync(&self, entries: &[NewSyncEntry]) -> StorageResult<Vec<i64>>;

    /// Claim up to `limit` entries due at `now`, honouring per-session order.
    async fn dequeue_ready_sync(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> StorageResult<Vec<SyncQueueEntry>>;

    /// Record the outcome of one upload attempt.
    async fn mark_sync_result(&self, entry_id: i64, outcome: SyncOutcome) -> StorageResult<()>;

    /// Persist the end of PROCESSING in one commit: the session update, its
    /// change records and its queue entries.
    async fn complete_processing(
        &self,
        session_id: SessionId,
        update: SessionUpdate,
        changes: &[ChangeRecord],
        entries: &[NewSyncEntry],
    ) -> StorageResult<()>;

    async fn find_session(&self, session_id: SessionId) -> StorageResult<Option<Session>>;

    /// The session still holding the door, if a crash interrupted one.
    async fn find_active_session(&self) -> StorageResult<Option<Session>>;

    async fn change_records_for(&self, session_id: SessionId) -> StorageResult<Vec<ChangeRecord>>;

    /// Return IN_FLIGHT entries to PENDING. Returns how many moved.
    async fn requeue_in_flight(&self) -> StorageResult<u64>;

    async fn failed_permanent_entries(&self) -> StorageResult<Vec<SyncQueueEntry>>;

    async fn sessions_needing_review(&self) -> StorageResult<Vec<Session>>;

    async fn sync_counts(&self) -> StorageResult<SyncCounts>;
}

/// [`DurableStore`] backed by SQLite.
///
/// Cloning is cheap; clones share the connection pool.
///
/// ```no_run
/// use stockroom_core::{CardId, Session};
/// use stockroom_storage::{DatabaseConfig, DurableStore, SqliteStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SqliteStore::open(DatabaseConfig::new("stockroom.db")).await?;
/// let session_id = store
///     .append_session(&Session::start(CardId::new("04ABCDEF")?))
///     .await?;
/// assert!(store.find_session(session_id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open the database file and apply migrations.
    pub async fn open(config: DatabaseConfig) -> StorageResult<Self> {
        Ok(Self::new(Database::new(config).await?))
    }

    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    pub async fn close(&self) {
        self.db.close().await;
    }

    fn sessions(&self) -> SqliteSessionRepository {
        SqliteSessionRepository::new(self.db.pool().clone())
    }

    fn queue(&self) -> SqliteSyncQueueRepository {
        SqliteSyncQueueRepository::new(self.db.pool().clone())
    }
}

impl DurableStore for SqliteStore {
    async fn append_session(&self, session: &Session) -> StorageResult<SessionId> {
        let mut tx = self.db.pool().begin().await?;
        transaction::insert_session(&mut tx, session).await?;
        tx.commit().await?;

        debug!(session_id = %session.session_id, card_id = %session.card_id, "Session persisted");
        Ok(session.session_id)
    }

    async fn update_session(
        &self,
        session_id: SessionId,
        update: SessionUpdate,
    ) -> StorageResult<()> {
        let mut tx = self.db.pool().begin().await?;
        transaction::update_session(&mut tx, session_id, &update, Utc::now()).await?;
        tx.commit().await?;

        debug!(%session_id, state = ?update.state, "Session updated");
        Ok(())
    }

    async fn enqueue_sync(&self, entries: &[NewSyncEntry]) -> StorageResult<Vec<i64>> {
        let mut tx = self.db.pool().begin().await?;
        let ids = transaction::insert_sync_entries(&mut tx, entries, Utc::now()).await?;
        tx.commit().await?;

        debug!(count = ids.len(), "Sync entries enqueued");
        Ok(ids)
    }

    async fn dequeue_ready_sync(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> StorageResult<Vec<SyncQueueEntry>> {
        let mut tx = self.db.pool().begin().await?;
        let entries = transaction::claim_ready_entries(&mut tx, now, limit).await?;
        tx.commit().await?;

        if !entries.is_empty() {
            debug!(count = entries.len(), "Sync entries claimed");
        }
        Ok(entries)
    }

    async fn mark_sync_result(&self, entry_id: i64, outcome: SyncOutcome) -> StorageResult<()> {
        let mut tx = self.db.pool().begin().await?;
        transaction::record_sync_outcome(&mut tx, entry_id, &outcome, Utc::now()).await?;
        tx.commit().await?;

        debug!(entry_id, ?outcome, "Sync outcome recorded");
        Ok(())
    }

    async fn complete_processing(
        &self,
        session_id: SessionId,
        update: SessionUpdate,
        changes: &[ChangeRecord],
        entries: &[NewSyncEntry],
    ) -> StorageResult<()> {
        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;
        transaction::update_session(&mut tx, session_id, &update, now).await?;
        transaction::insert_change_records(&mut tx, changes).await?;
        transaction::insert_sync_entries(&mut tx, entries, now).await?;
        tx.commit().await?;

        info!(
            %session_id,
            changes = changes.len(),
            entries = entries.len(),
            "Session processing committed"
        );
        Ok(())
    }

    async fn find_session(&self, session_id: SessionId) -> StorageResult<Option<Session>> {
        self.sessions().find_by_id(session_id).await
    }

    async fn find_active_session(&self) -> StorageResult<Option<Session>> {
        self.sessions().find_active().await
    }

    async fn change_records_for(&self, session_id: SessionId) -> StorageResult<Vec<ChangeRecord>> {
        self.sessions().change_records_for(session_id).await
    }

    async fn requeue_in_flight(&self) -> StorageResult<u64> {
        let mut tx = self.db.pool().begin().await?;
        let count = transaction::requeue_in_flight(&mut tx, Utc::now()).await?;
        tx.commit().await?;

        if count > 0 {
            warn!(count, "Interrupted uploads returned to the queue");
        }
        Ok(count)
    }

    async fn failed_permanent_entries(&self) -> StorageResult<Vec<SyncQueueEntry>> {
        self.queue().find_failed_permanent().await
    }

    async fn sessions_needing_review(&self) -> StorageResult<Vec<Session>> {
        self.sessions().find_needing_review().await
    }

    async fn sync_counts(&self) -> StorageResult<SyncCounts> {
        self.queue().counts().await
    }
}

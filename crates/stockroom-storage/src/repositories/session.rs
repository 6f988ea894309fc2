#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::{ChangeRecordRow, SessionRow};
use sqlx::SqlitePool;
use stockroom_core::{ChangeRecord, Session, SessionId};

/// Read access to sessions and their change records.
///
/// Session writes go through [`crate::transaction`] so that they can be
/// grouped with change records and queue entries.
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, session_id: SessionId) -> StorageResult<Option<Session>>;

    /// The session still holding the door, if any.
    ///
    /// At most one session is active at a time; should a crash have left
    /// several, the oldest is returned.
    async fn find_active(&self) -> StorageResult<Option<Session>>;

    /// Finished sessions held for an operator because their diff could not
    /// be trusted, oldest first.
    async fn find_needing_review(&self) -> StorageResult<Vec<Session>>;

    /// Most recent sessions, newest first.
    async fn find_recent(&self, limit: i64) -> StorageResult<Vec<Session>>;

    /// Change records of one session, ordered by item.
    async fn change_records_for(&self, session_id: SessionId) -> StorageResult<Vec<ChangeRecord>>;
}

/// SQLite implementation of SessionRepository
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn into_sessions(rows: Vec<SessionRow>) -> StorageResult<Vec<Session>> {
    rows.into_iter().map(Session::try_from).collect()
}

impl SessionRepository for SqliteSessionRepository {
    async fn find_by_id(&self, session_id: SessionId) -> StorageResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, card_id, state, door_opened_at, door_closed_at,
                   before_snapshot, after_snapshot, sync_status,
                   anomalous, anomaly_reason, error_marker, created_at, updated_at
            FROM sessions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn find_active(&self) -> StorageResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, card_id, state, door_opened_at, door_closed_at,
                   before_snapshot, after_snapshot, sync_status,
                   anomalous, anomaly_reason, error_marker, created_at, updated_at
            FROM sessions
            WHERE state IN ('session_start', 'monitor', 'processing')
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn find_needing_review(&self) -> StorageResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, card_id, state, door_opened_at, door_closed_at,
                   before_snapshot, after_snapshot, sync_status,
                   anomalous, anomaly_reason, error_marker, created_at, updated_at
            FROM sessions
            WHERE error_marker IS NOT NULL AND state = 'sync'
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        into_sessions(rows)
    }

    async fn find_recent(&self, limit: i64) -> StorageResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, card_id, state, door_opened_at, door_closed_at,
                   before_snapshot, after_snapshot, sync_status,
                   anomalous, anomaly_reason, error_marker, created_at, updated_at
            FROM sessions
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_sessions(rows)
    }

    async fn change_records_for(&self, session_id: SessionId) -> StorageResult<Vec<ChangeRecord>> {
        let rows = sqlx::query_as::<_, ChangeRecordRow>(
            r#"
            SELECT change_id, session_id, item_id, kind, from_location, to_location
            FROM change_records
            WHERE session_id = ?
            ORDER BY item_id
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChangeRecord::try_from).collect()
    }
}

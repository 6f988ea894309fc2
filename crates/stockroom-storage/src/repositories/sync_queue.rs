#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::{SyncCounts, SyncEntryRow, SyncQueueEntry};
use sqlx::SqlitePool;
use stockroom_core::SessionId;

/// Read access to the sync queue.
///
/// Claiming and outcome recording change several rows at once and live in
/// [`crate::transaction`].
pub trait SyncQueueRepository: Send + Sync {
    async fn find_by_id(&self, entry_id: i64) -> StorageResult<Option<SyncQueueEntry>>;

    /// Entries of one session in upload order.
    async fn find_by_session(&self, session_id: SessionId) -> StorageResult<Vec<SyncQueueEntry>>;

    /// Entries the server rejected, oldest first.
    async fn find_failed_permanent(&self) -> StorageResult<Vec<SyncQueueEntry>>;

    /// Totals by status.
    async fn counts(&self) -> StorageResult<SyncCounts>;
}

/// SQLite implementation of SyncQueueRepository
pub struct SqliteSyncQueueRepository {
    pool: SqlitePool,
}

impl SqliteSyncQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn into_entries(rows: Vec<SyncEntryRow>) -> StorageResult<Vec<SyncQueueEntry>> {
    rows.into_iter().map(SyncQueueEntry::try_from).collect()
}

impl SyncQueueRepository for SqliteSyncQueueRepository {
    async fn find_by_id(&self, entry_id: i64) -> StorageResult<Option<SyncQueueEntry>> {
        let row = sqlx::query_as::<_, SyncEntryRow>(
            r#"
            SELECT entry_id, session_id, seq, upload_id, payload, status,
                   attempt_count, last_attempt_at, next_attempt_at, last_error
            FROM sync_queue
            WHERE entry_id = ?
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncQueueEntry::try_from).transpose()
    }

    async fn find_by_session(&self, session_id: SessionId) -> StorageResult<Vec<SyncQueueEntry>> {
        let rows = sqlx::query_as::<_, SyncEntryRow>(
            r#"
            SELECT entry_id, session_id, seq, upload_id, payload, status,
                   attempt_count, last_attempt_at, next_attempt_at, last_error
            FROM sync_queue
            WHERE session_id = ?
            ORDER BY seq
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        into_entries(rows)
    }

    async fn find_failed_permanent(&self) -> StorageResult<Vec<SyncQueueEntry>> {
        let rows = sqlx::query_as::<_, SyncEntryRow>(
            r#"
            SELECT entry_id, session_id, seq, upload_id, payload, status,
                   attempt_count, last_attempt_at, next_attempt_at, last_error
            FROM sync_queue
            WHERE status = 'failed_permanent'
            ORDER BY entry_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        into_entries(rows)
    }

    async fn counts(&self) -> StorageResult<SyncCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = SyncCounts::default();
        for (status, count) in rows {
            match status.as_str() {
                "pending" => counts.pending = count,
                "in_flight" => counts.in_flight = count,
                "confirmed" => counts.confirmed = count,
                "failed_permanent" => counts.failed_permanent = count,
                _ => {}
            }
        }

        Ok(counts)
    }
}

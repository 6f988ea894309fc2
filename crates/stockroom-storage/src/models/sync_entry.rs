use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use stockroom_core::{ChangeRecord, Session, SessionId, SyncStatus, UploadRequest};

/// Entry to be appended to the sync queue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncEntry {
    pub session_id: SessionId,
    /// Position within the session; entries upload in ascending order.
    pub seq: u32,
    pub payload: UploadRequest,
}

impl NewSyncEntry {
    /// Queue entries for a finished session: the session summary at seq 0,
    /// then change batches of at most `max_changes` records.
    pub fn plan(session: &Session, changes: &[ChangeRecord], max_changes: usize) -> Vec<Self> {
        UploadRequest::plan(session, changes, max_changes)
            .into_iter()
            .enumerate()
            .map(|(seq, payload)| Self {
                session_id: session.session_id,
                seq: u32::try_from(seq).unwrap_or(u32::MAX),
                payload,
            })
            .collect()
    }
}

/// One durable unit of upload work.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncQueueEntry {
    pub entry_id: i64,
    pub session_id: SessionId,
    pub seq: u32,
    pub upload_id: String,
    pub payload: UploadRequest,
    pub status: SyncStatus,
    /// Upload attempts whose outcome has been recorded.
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest retry time; `None` means due now.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Raw `sync_queue` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncEntryRow {
    pub entry_id: i64,
    pub session_id: String,
    pub seq: i64,
    pub upload_id: String,
    pub payload: String,
    pub status: String,
    pub attempt_count: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl TryFrom<SyncEntryRow> for SyncQueueEntry {
    type Error = StorageError;

    fn try_from(row: SyncEntryRow) -> StorageResult<Self> {
        Ok(SyncQueueEntry {
            entry_id: row.entry_id,
            session_id: row.session_id.parse()?,
            seq: u32::try_from(row.seq)
                .map_err(|_| StorageError::Corrupt(format!("negative seq {}", row.seq)))?,
            upload_id: row.upload_id,
            payload: serde_json::from_str(&row.payload)?,
            status: row.status.parse()?,
            attempt_count: u32::try_from(row.attempt_count).unwrap_or(u32::MAX),
            last_attempt_at: row.last_attempt_at,
            next_attempt_at: row.next_attempt_at,
            last_error: row.last_error,
        })
    }
}

/// Result of one upload attempt, as recorded by `mark_sync_result`.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Server acknowledged the upload.
    Confirmed,

    /// Transient failure; eligible again at `next_attempt_at`.
    Retry {
        next_attempt_at: DateTime<Utc>,
        error: String,
    },

    /// Rejected by the server; never retried automatically.
    Failed { error: String },
}

/// Sync queue totals by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub pending: i64,
    pub in_flight: i64,
    pub confirmed: i64,
    pub failed_permanent: i64,
}

impl SyncCounts {
    /// Entries still awaiting a successful upload.
    pub fn outstanding(&self) -> i64 {
        self.pending + self.in_flight
    }
}

//! Transaction-scoped write operations.
//!
//! Every function takes an open SQLite transaction so that the durable store
//! can group several writes into one atomic commit. The session pipeline
//! relies on this for `complete_processing`: the after-snapshot, the change
//! records and the sync entries land together or not at all.
//!
//! ```no_run
//! use stockroom_core::{CardId, Session};
//! use stockroom_storage::{Database, transaction};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::in_memory().await?;
//! let session = Session::start(CardId::new("04ABCDEF")?);
//!
//! let mut tx = db.pool().begin().await?;
//! transaction::insert_session(&mut tx, &session).await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{StorageError, StorageResult};
use crate::models::{NewSyncEntry, SessionUpdate, SyncEntryRow, SyncOutcome, SyncQueueEntry};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use stockroom_core::{ChangeRecord, Session, SessionId};

/// Insert a new session row.
///
/// # Errors
///
/// Returns error if a session with the same id already exists.
pub async fn insert_session(tx: &mut Transaction<'_, Sqlite>, session: &Session) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (
            session_id, card_id, state, door_opened_at, door_closed_at,
            before_snapshot, after_snapshot, sync_status,
            anomalous, anomaly_reason, error_marker, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.session_id.to_string())
    .bind(session.card_id.as_str())
    .bind(session.state.as_str())
    .bind(session.door_opened_at)
    .bind(session.door_closed_at)
    .bind(serde_json::to_string(&session.before_snapshot)?)
    .bind(serde_json::to_string(&session.after_snapshot)?)
    .bind(session.sync_status.as_str())
    .bind(session.anomalous)
    .bind(&session.anomaly_reason)
    .bind(&session.error_marker)
    .bind(session.created_at)
    .bind(session.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Apply a partial update to a session.
///
/// # Errors
///
/// Returns `NotFound` for an unknown session and `Validation` for a session
/// whose upload is already confirmed (confirmed sessions are read-only).
pub async fn update_session(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: SessionId,
    update: &SessionUpdate,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    let before = update
        .before_snapshot
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let after = update
        .after_snapshot
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE sessions SET
            state           = COALESCE(?1, state),
            door_opened_at  = COALESCE(?2, door_opened_at),
            door_closed_at  = COALESCE(?3, door_closed_at),
            before_snapshot = COALESCE(?4, before_snapshot),
            after_snapshot  = COALESCE(?5, after_snapshot),
            sync_status     = COALESCE(?6, sync_status),
            anomalous       = CASE WHEN ?7 IS NULL THEN anomalous ELSE 1 END,
            anomaly_reason  = CASE
                                  WHEN ?7 IS NULL THEN anomaly_reason
                                  WHEN anomaly_reason IS NULL THEN ?7
                                  ELSE anomaly_reason || '; ' || ?7
                              END,
            error_marker    = COALESCE(?8, error_marker),
            updated_at      = ?9
        WHERE session_id = ?10 AND sync_status <> 'confirmed'
        "#,
    )
    .bind(update.state.map(|s| s.as_str()))
    .bind(update.door_opened_at)
    .bind(update.door_closed_at)
    .bind(before)
    .bind(after)
    .bind(update.sync_status.map(|s| s.as_str()))
    .bind(update.anomaly.as_deref())
    .bind(update.error_marker.as_deref())
    .bind(now)
    .bind(session_id.to_string())
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT sync_status FROM sessions WHERE session_id = ?")
                .bind(session_id.to_string())
                .fetch_optional(&mut **tx)
                .await?;

        return Err(match exists {
            Some(_) => StorageError::Validation(format!(
                "session {session_id} is confirmed and read-only"
            )),
            None => StorageError::not_found("session", "session_id", session_id),
        });
    }

    Ok(())
}

/// Insert the change records of one session.
pub async fn insert_change_records(
    tx: &mut Transaction<'_, Sqlite>,
    changes: &[ChangeRecord],
) -> StorageResult<()> {
    for change in changes {
        sqlx::query(
            r#"
            INSERT INTO change_records (
                change_id, session_id, item_id, kind, from_location, to_location
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&change.change_id)
        .bind(change.session_id.to_string())
        .bind(change.item_id.as_str())
        .bind(change.kind.as_str())
        .bind(&change.from_location)
        .bind(&change.to_location)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Append entries to the sync queue, eligible immediately.
///
/// New entries carry no `next_attempt_at`: a missing deadline means due
/// now, whatever clock the claimer uses. Returns the assigned entry ids in
/// input order.
pub async fn insert_sync_entries(
    tx: &mut Transaction<'_, Sqlite>,
    entries: &[NewSyncEntry],
    now: DateTime<Utc>,
) -> StorageResult<Vec<i64>> {
    let mut ids = Vec::with_capacity(entries.len());

    for entry in entries {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_queue (
                session_id, seq, upload_id, payload, status,
                attempt_count, next_attempt_at, created_at
            )
            VALUES (?, ?, ?, ?, 'pending', 0, NULL, ?)
            "#,
        )
        .bind(entry.session_id.to_string())
        .bind(i64::from(entry.seq))
        .bind(entry.payload.upload_id())
        .bind(serde_json::to_string(&entry.payload)?)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        ids.push(result.last_insert_rowid());
    }

    Ok(ids)
}

/// Claim up to `limit` entries that are due and whose predecessors in the
/// same session are all confirmed. Claimed entries move to IN_FLIGHT; the
/// attempt is counted once its outcome is recorded.
///
/// Returns the claimed entries ordered by due time, entries due now first.
pub async fn claim_ready_entries(
    tx: &mut Transaction<'_, Sqlite>,
    now: DateTime<Utc>,
    limit: u32,
) -> StorageResult<Vec<SyncQueueEntry>> {
    let rows = sqlx::query_as::<_, SyncEntryRow>(
        r#"
        UPDATE sync_queue
        SET status = 'in_flight'
        WHERE entry_id IN (
            SELECT q.entry_id
            FROM sync_queue q
            WHERE q.status = 'pending'
              AND (q.next_attempt_at IS NULL OR q.next_attempt_at <= ?1)
              AND NOT EXISTS (
                  SELECT 1 FROM sync_queue p
                  WHERE p.session_id = q.session_id
                    AND p.seq < q.seq
                    AND p.status <> 'confirmed'
              )
            ORDER BY q.next_attempt_at, q.entry_id
            LIMIT ?2
        )
        RETURNING entry_id, session_id, seq, upload_id, payload, status,
                  attempt_count, last_attempt_at, next_attempt_at, last_error
        "#,
    )
    .bind(now)
    .bind(i64::from(limit))
    .fetch_all(&mut **tx)
    .await?;

    let mut entries = rows
        .into_iter()
        .map(SyncQueueEntry::try_from)
        .collect::<StorageResult<Vec<_>>>()?;
    entries.sort_by(|a, b| {
        a.next_attempt_at
            .cmp(&b.next_attempt_at)
            .then(a.entry_id.cmp(&b.entry_id))
    });

    let mut sessions: Vec<SessionId> = entries.iter().map(|e| e.session_id).collect();
    sessions.sort();
    sessions.dedup();
    for session_id in sessions {
        refresh_session_sync_status(tx, session_id, now).await?;
    }

    Ok(entries)
}

/// Record the outcome of an upload attempt and count the attempt.
///
/// Outcomes for an entry that is already confirmed are ignored: a late
/// duplicate acknowledgement must not reopen it.
pub async fn record_sync_outcome(
    tx: &mut Transaction<'_, Sqlite>,
    entry_id: i64,
    outcome: &SyncOutcome,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    let (status, next_attempt_at, error) = match outcome {
        SyncOutcome::Confirmed => ("confirmed", None, None),
        SyncOutcome::Retry {
            next_attempt_at,
            error,
        } => ("pending", Some(*next_attempt_at), Some(error.as_str())),
        SyncOutcome::Failed { error } => ("failed_permanent", None, Some(error.as_str())),
    };

    let updated: Option<(String,)> = sqlx::query_as(
        r#"
        UPDATE sync_queue
        SET status = ?1,
            next_attempt_at = COALESCE(?2, next_attempt_at),
            last_error = ?3,
            attempt_count = attempt_count + 1,
            last_attempt_at = ?4
        WHERE entry_id = ?5 AND status <> 'confirmed'
        RETURNING session_id
        "#,
    )
    .bind(status)
    .bind(next_attempt_at)
    .bind(error)
    .bind(now)
    .bind(entry_id)
    .fetch_optional(&mut **tx)
    .await?;

    match updated {
        Some((session_id,)) => {
            let session_id: SessionId = session_id.parse()?;
            refresh_session_sync_status(tx, session_id, now).await
        }
        None => {
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT entry_id FROM sync_queue WHERE entry_id = ?")
                    .bind(entry_id)
                    .fetch_optional(&mut **tx)
                    .await?;
            match exists {
                Some(_) => Ok(()),
                None => Err(StorageError::not_found("sync entry", "entry_id", entry_id)),
            }
        }
    }
}

/// Return every IN_FLIGHT entry to PENDING, due at once.
///
/// Used at startup (an attempt was cut short by a crash) and at shutdown.
/// The interrupted attempt is not counted. Returns the number of entries
/// requeued.
pub async fn requeue_in_flight(
    tx: &mut Transaction<'_, Sqlite>,
    now: DateTime<Utc>,
) -> StorageResult<u64> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        UPDATE sync_queue
        SET status = 'pending',
            next_attempt_at = NULL
        WHERE status = 'in_flight'
        RETURNING session_id
        "#,
    )
    .fetch_all(&mut **tx)
    .await?;

    let count = rows.len() as u64;
    let mut sessions: Vec<String> = rows.into_iter().map(|(id,)| id).collect();
    sessions.sort();
    sessions.dedup();
    for session_id in sessions {
        refresh_session_sync_status(tx, session_id.parse()?, now).await?;
    }

    Ok(count)
}

/// Derive a session's sync status from its queue entries.
///
/// Any permanent failure wins; otherwise the session is confirmed once
/// every entry is, and in flight while any entry is. Sessions without
/// entries keep their stored status.
pub async fn refresh_session_sync_status(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: SessionId,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        UPDATE sessions
        SET sync_status = (
                SELECT CASE
                    WHEN SUM(status = 'failed_permanent') > 0 THEN 'failed_permanent'
                    WHEN SUM(status = 'confirmed') = COUNT(*) THEN 'confirmed'
                    WHEN SUM(status = 'in_flight') > 0 THEN 'in_flight'
                    ELSE 'pending'
                END
                FROM sync_queue
                WHERE session_id = ?1
            ),
            updated_at = ?2
        WHERE session_id = ?1
          AND EXISTS (SELECT 1 FROM sync_queue WHERE session_id = ?1)
        "#,
    )
    .bind(session_id.to_string())
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

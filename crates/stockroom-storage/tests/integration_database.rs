//! Integration tests for the file-backed database and concurrent claims.
//!
//! Run with: cargo test --package stockroom-storage --test integration_database

use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use stockroom_core::{CardId, Session, SessionState};
use stockroom_storage::{
    Database, DatabaseConfig, DurableStore, NewSyncEntry, SessionUpdate, SqliteStore, SyncOutcome,
};
use tokio::sync::Barrier;

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    db.health_check().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();

    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM sqlite_master
        WHERE type = 'table'
          AND name IN ('authorized_cards', 'sessions', 'change_records',
                       'sync_queue', 'access_attempts')
        "#,
    )
    .fetch_one(db.pool())
    .await
    .unwrap();

    assert_eq!(count, 5);
    db.close().await;
}

#[tokio::test]
async fn test_unknown_session_state_is_rejected_by_schema() {
    let db = Database::in_memory().await.unwrap();
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO sessions (session_id, card_id, state, created_at, updated_at)
        VALUES ('x', '04ABCDEF', 'idle', ?, ?)
        "#,
    )
    .bind(now)
    .bind(now)
    .execute(db.pool())
    .await;

    assert!(result.is_err());
}

async fn queued_sessions(store: &SqliteStore, count: usize) {
    for _ in 0..count {
        let session = Session::start(CardId::new("04ABCDEF").unwrap());
        store.append_session(&session).await.unwrap();
        store
            .complete_processing(
                session.session_id,
                SessionUpdate::new().state(SessionState::Sync),
                &[],
                &NewSyncEntry::plan(&session, &[], 10),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_concurrent_claims_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("claims.db");
    let store = SqliteStore::open(DatabaseConfig::new(path.to_string_lossy()))
        .await
        .unwrap();

    const SESSIONS: usize = 20;
    const WORKERS: usize = 4;
    queued_sessions(&store, SESSIONS).await;

    let barrier = Arc::new(Barrier::new(WORKERS));
    let now = Utc::now() + Duration::seconds(1);
    let mut handles = vec![];

    for _ in 0..WORKERS {
        let store = store.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut claimed = vec![];
            loop {
                let batch = store.dequeue_ready_sync(now, 3).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                for entry in batch {
                    store
                        .mark_sync_result(entry.entry_id, SyncOutcome::Confirmed)
                        .await
                        .unwrap();
                    claimed.push(entry.entry_id);
                }
            }
            claimed
        }));
    }

    let results = futures::future::join_all(handles).await;
    let mut seen = HashSet::new();
    for result in results {
        for entry_id in result.unwrap() {
            assert!(seen.insert(entry_id), "entry {entry_id} claimed twice");
        }
    }

    assert_eq!(seen.len(), SESSIONS);
    let counts = store.sync_counts().await.unwrap();
    assert_eq!(counts.confirmed, SESSIONS as i64);
    assert_eq!(counts.outstanding(), 0);

    store.close().await;
}

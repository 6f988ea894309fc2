//! Durability across an unclean stop.
//!
//! Each test writes through one store, drops it without any shutdown
//! bookkeeping, then reopens the same file the way a restarted controller
//! would.

use chrono::{Duration, Utc};
use std::path::Path;
use stockroom_core::{
    CardId, InventoryItemRecord, Session, SessionState, SyncStatus, diff_snapshots,
};
use stockroom_storage::{DatabaseConfig, DurableStore, NewSyncEntry, SessionUpdate, SqliteStore};

async fn open(path: &Path) -> SqliteStore {
    SqliteStore::open(DatabaseConfig::new(path.to_string_lossy()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_active_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stockroom.db");
    let before = vec![
        InventoryItemRecord::present("A1", "slot1"),
        InventoryItemRecord::present("B2", "slot2"),
    ];

    let session = Session::start(CardId::new("04ABCDEF").unwrap());
    {
        let store = open(&path).await;
        store.append_session(&session).await.unwrap();
        store
            .update_session(
                session.session_id,
                SessionUpdate::new()
                    .state(SessionState::Monitor)
                    .door_opened_at(Utc::now())
                    .before_snapshot(before.clone()),
            )
            .await
            .unwrap();
        // Dropped without close: the commit must already be on disk.
    }

    let store = open(&path).await;
    let active = store.find_active_session().await.unwrap().unwrap();
    assert_eq!(active.session_id, session.session_id);
    assert_eq!(active.state, SessionState::Monitor);
    assert_eq!(active.before_snapshot, before);
    assert!(active.door_opened_at.is_some());
    assert!(active.door_closed_at.is_none());
    store.close().await;
}

#[tokio::test]
async fn test_in_flight_upload_is_requeued_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stockroom.db");

    let session = Session::start(CardId::new("04ABCDEF").unwrap());
    let before = vec![InventoryItemRecord::present("A1", "slot1")];
    let after = vec![InventoryItemRecord::present("A1", "slot2")];
    let changes = diff_snapshots(session.session_id, &before, &after).unwrap();

    let claimed_upload_id = {
        let store = open(&path).await;
        store.append_session(&session).await.unwrap();
        store
            .complete_processing(
                session.session_id,
                SessionUpdate::new()
                    .state(SessionState::Sync)
                    .before_snapshot(before)
                    .after_snapshot(after),
                &changes,
                &NewSyncEntry::plan(&session, &changes, 100),
            )
            .await
            .unwrap();

        let claimed = store
            .dequeue_ready_sync(Utc::now() + Duration::seconds(1), 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        claimed[0].upload_id.clone()
    };

    let store = open(&path).await;
    assert!(store.find_active_session().await.unwrap().is_none());
    assert_eq!(store.sync_counts().await.unwrap().in_flight, 1);

    assert_eq!(store.requeue_in_flight().await.unwrap(), 1);
    let session_row = store.find_session(session.session_id).await.unwrap().unwrap();
    assert_eq!(session_row.sync_status, SyncStatus::Pending);

    let retried = store
        .dequeue_ready_sync(Utc::now() + Duration::seconds(1), 10)
        .await
        .unwrap();
    assert_eq!(retried.len(), 1);
    // Same payload identity, so the server can deduplicate the resend.
    assert_eq!(retried[0].upload_id, claimed_upload_id);
    // The crash cut the first attempt short, so it never counted.
    assert_eq!(retried[0].attempt_count, 0);
    assert_eq!(retried[0].next_attempt_at, None);

    assert_eq!(store.change_records_for(session.session_id).await.unwrap(), changes);
    store.close().await;
}

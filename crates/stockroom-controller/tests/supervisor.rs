//! End-to-end runs of the supervisor with mock peripherals.

use std::future::Future;
use std::time::Duration;
use stockroom_controller::{ControllerConfig, Peripherals, Supervisor, SyncConfig};
use stockroom_core::{CardId, InventoryItemRecord, Session, SessionState, SyncStatus};
use stockroom_hardware::mock::{
    MockCardReader, MockCardReaderHandle, MockDoor, MockDoorHandle, MockScanner, MockScannerHandle,
};
use stockroom_network::{MockResponse, MockUploader};
use stockroom_storage::{
    AuthorizedCard, CardRepository, DatabaseConfig, DurableStore, SessionRepository,
    SessionUpdate, SqliteCardRepository, SqliteSessionRepository, SqliteStore,
};
use tempfile::TempDir;

const CARD_UID: [u8; 4] = [0x04, 0xAB, 0xCD, 0xEF];

struct Devices {
    peripherals: Peripherals,
    cards: MockCardReaderHandle,
    door: MockDoorHandle,
    scanner: MockScannerHandle,
}

fn devices() -> Devices {
    let (reader, cards) = MockCardReader::new();
    let (door, door_handle) = MockDoor::new();
    let (scanner, scanner_handle) = MockScanner::new();
    Devices {
        peripherals: Peripherals {
            card_reader: reader.into(),
            door: door.into(),
            scanner: scanner.into(),
        },
        cards,
        door: door_handle,
        scanner: scanner_handle,
    }
}

fn config() -> ControllerConfig {
    ControllerConfig::default()
        .door_open_timeout(Duration::from_secs(10))
        .scan_timeout(Duration::from_secs(2))
        .shutdown_grace(Duration::from_secs(30))
        .sync(
            SyncConfig::default()
                .poll_interval(Duration::from_millis(20))
                .backoff(Duration::from_millis(50), Duration::from_secs(1)),
        )
}

async fn open_store(dir: &TempDir) -> SqliteStore {
    let path = dir.path().join("stockroom.db");
    let store = SqliteStore::open(DatabaseConfig::new(path.to_string_lossy()))
        .await
        .unwrap();
    SqliteCardRepository::new(store.pool().clone())
        .upsert(&AuthorizedCard::new("04ABCDEF", "Lab Technician"))
        .await
        .unwrap();
    store
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached within 10s");
}

#[tokio::test]
async fn test_card_tap_is_recorded_and_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let devices = devices();
    devices.door.set_auto_close(Some(Duration::from_millis(50)));
    devices
        .scanner
        .push_scan(vec![InventoryItemRecord::present("A1", "slot1")]);
    devices
        .scanner
        .push_scan(vec![InventoryItemRecord::present("A1", "slot2")]);

    let uploader = MockUploader::new();
    let controller = Supervisor::start(config(), store.clone(), devices.peripherals, uploader.clone())
        .await
        .unwrap();

    devices.cards.present_card(CARD_UID.to_vec()).await.unwrap();
    let handle = &controller;
    eventually(|| async move { handle.status().await.unwrap().sync.confirmed == 2 }).await;

    let status = controller.status().await.unwrap();
    assert!(status.running);
    assert_eq!(status.sync.confirmed, 2);
    assert_eq!(status.sync_stats.confirmed, 2);
    assert!(status.fault.is_none());

    let sessions = SqliteSessionRepository::new(store.pool().clone())
        .find_recent(10)
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    let stored = store.find_session(sessions[0].session_id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Confirmed);
    assert_eq!(uploader.applied_count(), 2);

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_second_card_during_session_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let devices = devices();

    let controller = Supervisor::start(config(), store.clone(), devices.peripherals, MockUploader::new())
        .await
        .unwrap();
    let status_reader = controller.status_reader();
    let status_reader = &status_reader;

    devices.cards.present_card(CARD_UID.to_vec()).await.unwrap();
    devices.door.wait_for_unlock().await;
    assert!(status_reader.status().await.unwrap().session_active);

    devices.cards.present_card(CARD_UID.to_vec()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(devices.door.unlock_count(), 1);

    devices.door.close_door();
    eventually(|| async move { !status_reader.status().await.unwrap().session_active }).await;

    let sessions = SqliteSessionRepository::new(store.pool().clone())
        .find_recent(10)
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].state, SessionState::Sync);

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_startup_recovers_interrupted_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let session = Session::start(CardId::new("04ABCDEF").unwrap());
    store.append_session(&session).await.unwrap();
    store
        .update_session(
            session.session_id,
            SessionUpdate::new()
                .state(SessionState::Monitor)
                .door_opened_at(chrono::Utc::now())
                .before_snapshot(vec![InventoryItemRecord::present("B2", "shelf")]),
        )
        .await
        .unwrap();

    let devices = devices();
    devices.door.set_auto_close(Some(Duration::from_millis(50)));
    let uploader = MockUploader::new();

    let controller = Supervisor::start(config(), store.clone(), devices.peripherals, uploader.clone())
        .await
        .unwrap();

    // Recovery completes before start returns.
    let stored = store.find_session(session.session_id).await.unwrap().unwrap();
    assert_eq!(stored.state, SessionState::Sync);
    assert!(stored.anomalous);
    assert_eq!(devices.door.unlock_count(), 0);

    let delivered = &uploader;
    eventually(|| async move { delivered.applied_count() == 2 }).await;
    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_leaves_undelivered_uploads_pending() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let devices = devices();
    devices.door.set_auto_close(Some(Duration::from_millis(50)));

    let uploader = MockUploader::new();
    uploader.set_offline(true);
    let controller = Supervisor::start(config(), store.clone(), devices.peripherals, uploader.clone())
        .await
        .unwrap();

    devices.cards.present_card(CARD_UID.to_vec()).await.unwrap();
    let attempts = &uploader;
    eventually(|| async move { attempts.attempt_count() >= 2 }).await;
    controller.shutdown().await.unwrap();

    let store = open_store(&dir).await;
    let counts = store.sync_counts().await.unwrap();
    assert_eq!(counts.in_flight, 0);
    assert_eq!(counts.pending, 1);
    store.close().await;
}

#[tokio::test]
async fn test_permanent_rejection_is_surfaced_for_review() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let devices = devices();
    devices.door.set_auto_close(Some(Duration::from_millis(50)));

    let uploader = MockUploader::new();
    uploader.push_response(MockResponse::Permanent("400 Bad Request".into()));
    let controller = Supervisor::start(config(), store.clone(), devices.peripherals, uploader.clone())
        .await
        .unwrap();

    devices.cards.present_card(CARD_UID.to_vec()).await.unwrap();
    let handle = &controller;
    eventually(|| async move { handle.status().await.unwrap().sync.failed_permanent == 1 }).await;

    assert_eq!(store.failed_permanent_entries().await.unwrap().len(), 1);
    assert!(controller.faulted().is_none());
    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_storage_failure_faults_controller() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let devices = devices();

    let controller = Supervisor::start(config(), store.clone(), devices.peripherals, MockUploader::new())
        .await
        .unwrap();
    let mut faults = controller.fault_receiver();

    store.close().await;
    devices.cards.present_card(CARD_UID.to_vec()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), faults.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(controller.faulted().is_some());
    assert_eq!(devices.door.unlock_count(), 0);

    // The closed store cannot requeue.
    assert!(controller.shutdown().await.is_err());
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let result = Supervisor::start(
        config().scan_attempts(0),
        store,
        devices().peripherals,
        MockUploader::new(),
    )
    .await;

    assert!(result.is_err());
}

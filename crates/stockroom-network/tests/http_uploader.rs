//! HttpUploader against a local axum server.
//!
//! Run with: cargo test --package stockroom-network --test http_uploader

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockroom_core::{CardId, ChangeKind, ChangeRecord, ItemId, Session, UploadRequest};
use stockroom_network::{HttpUploader, HttpUploaderConfig, UploadError, Uploader};
use tokio::net::TcpListener;

#[derive(Debug, Default)]
struct Received {
    path: String,
    idempotency_key: Option<String>,
    body: serde_json::Value,
}

#[derive(Clone, Default)]
struct ServerState {
    statuses: Arc<Mutex<VecDeque<StatusCode>>>,
    received: Arc<Mutex<Vec<Received>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

async fn record(
    state: &ServerState,
    path: &str,
    headers: HeaderMap,
    body: serde_json::Value,
) -> StatusCode {
    let delay = *state.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    state.received.lock().unwrap().push(Received {
        path: path.to_string(),
        idempotency_key: headers
            .get("idempotency-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    state
        .statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(StatusCode::CREATED)
}

async fn sessions(
    State(state): State<ServerState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<serde_json::Value>,
) -> StatusCode {
    record(&state, "/sessions", headers, body).await
}

async fn changes(
    State(state): State<ServerState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<serde_json::Value>,
) -> StatusCode {
    record(&state, "/changes", headers, body).await
}

async fn spawn_server() -> (String, ServerState) {
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/v1/sessions", post(sessions))
        .route("/api/v1/changes", post(changes))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/api/v1"), state)
}

fn plan() -> Vec<UploadRequest> {
    let session = Session::start(CardId::new("04ABCDEF").unwrap());
    let change = ChangeRecord::new(
        session.session_id,
        ItemId::new("A1"),
        ChangeKind::Moved,
        Some("slot1".into()),
        Some("slot2".into()),
    );
    UploadRequest::plan(&session, &[change], 100)
}

#[tokio::test]
async fn test_uploads_route_by_kind_with_idempotency_key() {
    let (base_url, state) = spawn_server().await;
    let uploader = HttpUploader::new(HttpUploaderConfig::new(base_url)).unwrap();
    let plan = plan();

    for request in &plan {
        uploader.upload(request).await.unwrap();
    }

    let received = state.received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].path, "/sessions");
    assert_eq!(received[0].idempotency_key, Some(plan[0].upload_id()));
    assert_eq!(received[0].body["type"], "session");

    assert_eq!(received[1].path, "/changes");
    assert_eq!(received[1].idempotency_key, Some(plan[1].upload_id()));
    assert_eq!(received[1].body["changes"][0]["kind"], "MOVED");
}

#[tokio::test]
async fn test_conflict_means_already_applied() {
    let (base_url, state) = spawn_server().await;
    state.statuses.lock().unwrap().push_back(StatusCode::CONFLICT);
    let uploader = HttpUploader::new(HttpUploaderConfig::new(base_url)).unwrap();

    assert_eq!(uploader.upload(&plan()[0]).await, Ok(()));
}

#[tokio::test]
async fn test_server_errors_are_classified() {
    let (base_url, state) = spawn_server().await;
    state
        .statuses
        .lock()
        .unwrap()
        .extend([StatusCode::SERVICE_UNAVAILABLE, StatusCode::BAD_REQUEST]);
    let uploader = HttpUploader::new(HttpUploaderConfig::new(base_url)).unwrap();
    let request = &plan()[0];

    assert!(matches!(
        uploader.upload(request).await,
        Err(UploadError::Transient(_))
    ));
    assert!(matches!(
        uploader.upload(request).await,
        Err(UploadError::Permanent(_))
    ));
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let uploader = HttpUploader::new(
        HttpUploaderConfig::new(format!("http://{addr}/api/v1")).timeout(Duration::from_secs(2)),
    )
    .unwrap();

    assert!(uploader.upload(&plan()[0]).await.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_slow_server_times_out_as_transient() {
    let (base_url, state) = spawn_server().await;
    *state.delay.lock().unwrap() = Some(Duration::from_millis(500));
    let uploader =
        HttpUploader::new(HttpUploaderConfig::new(base_url).timeout(Duration::from_millis(50)))
            .unwrap();

    assert!(uploader.upload(&plan()[0]).await.unwrap_err().is_transient());
}

//! Administrative HTTP surface.
//!
//! - `GET /` - service banner
//! - `GET /health` - liveness, `503` once the controller has faulted
//! - `GET /status` - sync queue counts and the active-session flag

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use stockroom_controller::{ControllerStatus, StatusReader};
use stockroom_core::VERSION;
use stockroom_core::constants::SERVICE_NAME;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub docs: &'static str,
}

pub fn router(status_reader: StatusReader) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(status_reader)
}

/// Serve the admin routes until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    status_reader: StatusReader,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Admin interface listening");
    }
    axum::serve(listener, router(status_reader))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn root_handler() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: SERVICE_NAME,
        version: VERSION,
        docs: "/docs",
    })
}

async fn health_handler(
    State(status_reader): State<StatusReader>,
) -> (StatusCode, Json<HealthStatus>) {
    let (code, status) = match status_reader.fault() {
        None => (StatusCode::OK, "healthy"),
        Some(_) => (StatusCode::SERVICE_UNAVAILABLE, "faulted"),
    };

    (
        code,
        Json(HealthStatus {
            status,
            version: VERSION,
            running: status_reader.is_running(),
        }),
    )
}

async fn status_handler(
    State(status_reader): State<StatusReader>,
) -> Result<Json<ControllerStatus>, (StatusCode, String)> {
    status_reader.status().await.map(Json).map_err(|e| {
        error!(error = %e, "Status query failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

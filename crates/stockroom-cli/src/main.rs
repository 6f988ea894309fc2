//! # stockroom
//!
//! Edge controller process for one inventory room.
//!
//! ```bash
//! stockroom --config /etc/stockroom/stockroom.toml
//! RUST_LOG=stockroom_controller=debug stockroom
//! ```
//!
//! Runs until SIGINT or SIGTERM, then shuts down gracefully. Exits non-zero
//! if the controller faulted on a storage failure.

mod admin;
mod config;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use stockroom_controller::{Peripherals, Supervisor};
use stockroom_core::CardId;
use stockroom_hardware::mock::{
    MockCardReader, MockCardReaderHandle, MockDoor, MockDoorHandle, MockScanner, MockScannerHandle,
};
use stockroom_network::HttpUploader;
use stockroom_storage::{AuthorizedCard, CardRepository, SqliteCardRepository, SqliteStore};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{CardEntry, Config};

/// Edge controller for a Stockroom inventory room.
#[derive(Parser, Debug)]
#[command(name = "stockroom")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "stockroom.toml")]
    config: PathBuf,
}

/// Control handles for the mock devices; dropping them disconnects the
/// devices.
struct MockControls {
    _cards: MockCardReaderHandle,
    _door: MockDoorHandle,
    _scanner: MockScannerHandle,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!(version = stockroom_core::VERSION, "Starting stockroom edge controller");

    let config = Config::load(&cli.config).context("failed to load configuration")?;
    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let http = config.uploader_config()?;
    info!(url = %http.base_url, "Uploading to remote server");
    let uploader = HttpUploader::new(http)?;

    let store = SqliteStore::open(config.database_config())
        .await
        .context("failed to open database")?;
    seed_cards(&store, &config.cards).await?;

    let (peripherals, _controls) = mock_peripherals();
    warn!("No hardware drivers available, using mock peripherals");

    let controller = Supervisor::start(config.controller_config(), store, peripherals, uploader)
        .await
        .context("failed to start controller")?;

    let listener = TcpListener::bind(&config.admin.bind)
        .await
        .with_context(|| format!("failed to bind admin interface to {}", config.admin.bind))?;
    let (stop_admin, admin_stopped) = oneshot::channel::<()>();
    let admin = tokio::spawn(admin::serve(listener, controller.status_reader(), async {
        let _ = admin_stopped.await;
    }));

    let mut faults = controller.fault_receiver();
    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        Ok(()) = faults.changed() => error!("Controller faulted, shutting down"),
    }

    let fault = controller.faulted();
    let stopped = controller.shutdown().await;

    let _ = stop_admin.send(());
    match admin.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Admin interface failed"),
        Err(e) => warn!(error = %e, "Admin task failed"),
    }

    if let Some(fault) = fault {
        bail!("controller faulted: {fault}");
    }
    stopped.context("graceful shutdown failed")?;
    info!("Goodbye");
    Ok(())
}

async fn seed_cards(store: &SqliteStore, cards: &[CardEntry]) -> Result<()> {
    let repo = SqliteCardRepository::new(store.pool().clone());
    for entry in cards {
        let card_id = CardId::new(&entry.card_id)
            .with_context(|| format!("invalid card id {:?} in configuration", entry.card_id))?;
        repo.upsert(&AuthorizedCard::new(card_id.as_str(), &entry.holder_name))
            .await
            .context("failed to store authorized card")?;
    }

    if !cards.is_empty() {
        info!(count = cards.len(), "Authorized cards loaded from configuration");
    }
    Ok(())
}

fn mock_peripherals() -> (Peripherals, MockControls) {
    let (reader, cards) = MockCardReader::new();
    let (door, door_handle) = MockDoor::new();
    let (scanner, scanner_handle) = MockScanner::new();

    let peripherals = Peripherals {
        card_reader: reader.into(),
        door: door.into(),
        scanner: scanner.into(),
    };
    let controls = MockControls {
        _cards: cards,
        _door: door_handle,
        _scanner: scanner_handle,
    };
    (peripherals, controls)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

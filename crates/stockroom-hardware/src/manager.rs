//! Peripheral device manager.
//!
//! The manager owns the event-producing peripherals (currently the card
//! reader), runs each in its own task and funnels their output into a single
//! bounded channel consumed by the controller's dispatch loop.
//!
//! ```text
//! ┌──────────┐       ┌─────────────────┐
//! │ Reader   │──────►│  Event Channel  │──────► Card dispatcher
//! │ Task     │       │  (mpsc)         │
//! └──────────┘       └─────────────────┘
//! ```
//!
//! Door and scanner are request/response devices and stay with the session
//! pipeline that drives them.
//!
//! ```no_run
//! use stockroom_hardware::devices::AnyCardReader;
//! use stockroom_hardware::manager::{PeripheralConfig, PeripheralManager};
//! use stockroom_hardware::mock::MockCardReader;
//!
//! #[tokio::main]
//! async fn main() -> stockroom_hardware::Result<()> {
//!     let mut manager = PeripheralManager::new(PeripheralConfig::default());
//!
//!     let (reader, _handle) = MockCardReader::new();
//!     manager.register_card_reader(AnyCardReader::Mock(reader));
//!
//!     let mut handle = manager.start();
//!     while let Some(event) = handle.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::devices::AnyCardReader;
use crate::traits::CardReader;
use crate::types::DeviceKind;
use crate::{CardData, Result};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Events produced by managed peripherals.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum PeripheralEvent {
    /// A card was presented at the reader.
    CardPresented(CardData),

    /// A device task failed and stopped.
    DeviceError { device: DeviceKind, error: String },
}

/// Manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralConfig {
    /// Whether the card reader task is started.
    pub card_reader_enabled: bool,

    /// Capacity of the shared event channel.
    pub event_capacity: usize,

    /// Minimum delay between consecutive reads, to prevent busy-waiting on
    /// a misbehaving device.
    pub min_poll_interval: Duration,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            card_reader_enabled: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            min_poll_interval: Duration::from_millis(10),
        }
    }
}

/// Handle to running peripheral tasks.
pub struct PeripheralHandle {
    event_rx: mpsc::Receiver<PeripheralEvent>,
    tasks: JoinSet<Result<()>>,
}

impl PeripheralHandle {
    /// Receive the next event, or `None` once every device task has ended.
    pub async fn recv(&mut self) -> Option<PeripheralEvent> {
        self.event_rx.recv().await
    }

    /// Stop all device tasks.
    pub async fn shutdown(mut self) -> Result<()> {
        self.tasks.abort_all();

        let mut error_count = 0;
        let mut panic_count = 0;

        while let Some(result) = self.tasks.join_next().await {
            match Self::classify_task_result(result) {
                TaskTermination::Success | TaskTermination::Cancelled => {}
                TaskTermination::Error => error_count += 1,
                TaskTermination::Panic => panic_count += 1,
            }
        }

        if error_count + panic_count > 0 {
            warn!(error_count, panic_count, "Peripheral tasks ended abnormally");
        } else {
            debug!("Peripheral tasks stopped");
        }

        Ok(())
    }

    fn classify_task_result(
        result: std::result::Result<Result<()>, tokio::task::JoinError>,
    ) -> TaskTermination {
        match result {
            Ok(Ok(())) => TaskTermination::Success,
            Ok(Err(_)) => TaskTermination::Error,
            Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
            Err(_) => TaskTermination::Panic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Success,
    Error,
    Cancelled,
    Panic,
}

/// Coordinates event-producing peripherals.
pub struct PeripheralManager {
    card_reader: Option<AnyCardReader>,
    event_tx: mpsc::Sender<PeripheralEvent>,
    event_rx: mpsc::Receiver<PeripheralEvent>,
    config: PeripheralConfig,
}

impl PeripheralManager {
    pub fn new(config: PeripheralConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));

        Self {
            card_reader: None,
            event_tx,
            event_rx,
            config,
        }
    }

    pub fn register_card_reader(&mut self, device: AnyCardReader) {
        self.card_reader = Some(device);
    }

    /// Returns `true` if a card reader is registered.
    pub fn has_card_reader(&self) -> bool {
        self.card_reader.is_some()
    }

    /// Spawn device tasks and return the handle receiving their events.
    pub fn start(mut self) -> PeripheralHandle {
        let mut tasks = JoinSet::new();

        if self.config.card_reader_enabled
            && let Some(device) = self.card_reader.take()
        {
            let tx = self.event_tx.clone();
            tasks.spawn(Self::card_reader_task(
                device,
                tx,
                self.config.min_poll_interval,
            ));
        }

        PeripheralHandle {
            event_rx: self.event_rx,
            tasks,
        }
    }

    async fn card_reader_task(
        mut device: AnyCardReader,
        tx: mpsc::Sender<PeripheralEvent>,
        min_poll_interval: Duration,
    ) -> Result<()> {
        if let Ok(info) = device.get_info().await {
            info!(reader = %info, "Card reader started");
        }

        loop {
            let start = Instant::now();

            match device.read_card().await {
                Ok(card) => match tx.try_send(PeripheralEvent::CardPresented(card)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(event)) => {
                        warn!("Peripheral event channel full, applying backpressure");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(TrySendError::Closed(_)) => break,
                },
                Err(e) => {
                    error!(error = %e, "Card reader failed");
                    let _ = tx
                        .send(PeripheralEvent::DeviceError {
                            device: DeviceKind::CardReader,
                            error: e.to_string(),
                        })
                        .await;
                    return Err(e);
                }
            }

            let elapsed = start.elapsed();
            if elapsed < min_poll_interval {
                tokio::time::sleep(min_poll_interval - elapsed).await;
            }
        }
        Ok(())
    }
}

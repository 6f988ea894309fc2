//! Session orchestration for the Stockroom edge controller.
//!
//! - [`SessionRunner`] - Card to queued upload, one session at a time
//! - [`SyncEngine`] - Background drain of the durable queue with backoff
//! - [`Supervisor`] - Startup recovery, task wiring, fault escalation and
//!   graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use stockroom_controller::{ControllerConfig, Peripherals, Supervisor};
//! use stockroom_hardware::mock::{MockCardReader, MockDoor, MockScanner};
//! use stockroom_network::MockUploader;
//! use stockroom_storage::{DatabaseConfig, SqliteStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open(DatabaseConfig::new("stockroom.db")).await?;
//! let (reader, _cards) = MockCardReader::new();
//! let (door, _door) = MockDoor::new();
//! let (scanner, _scanner) = MockScanner::new();
//!
//! let controller = Supervisor::start(
//!     ControllerConfig::default(),
//!     store,
//!     Peripherals {
//!         card_reader: reader.into(),
//!         door: door.into(),
//!         scanner: scanner.into(),
//!     },
//!     MockUploader::new(),
//! )
//! .await?;
//!
//! tokio::signal::ctrl_c().await?;
//! controller.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod session;
pub mod state_machine;
pub mod supervisor;
pub mod sync;

pub use backoff::{RetryPolicy, SyncClock};
pub use config::{ControllerConfig, SyncConfig};
pub use session::{RECOVERY_ANOMALY, SessionOutcome, SessionRunner};
pub use state_machine::{StateMachine, StateTransition};
pub use supervisor::{ControllerStatus, Peripherals, StatusReader, Supervisor, SupervisorHandle};
pub use sync::{DrainReport, SyncEngine, SyncStats, SyncStatsSnapshot};

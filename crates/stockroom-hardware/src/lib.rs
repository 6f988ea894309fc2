//! Hardware device abstraction layer for the Stockroom edge controller.
//!
//! This crate provides trait-based abstractions for the peripherals guarding
//! an inventory room: the proximity card reader at the entrance, the door
//! lock with its close sensor, and the in-room inventory scanner. Mock
//! implementations with control handles allow the full session pipeline to
//! run without physical hardware.
//!
//! # Design Philosophy
//!
//! - **Async-first**: All I/O operations are asynchronous using native `async fn`
//!   in traits (Rust 1.90 + Edition 2024 RPITIT).
//! - **Enum dispatch**: [`devices`] wraps concrete drivers in enums instead of
//!   trait objects.
//! - **Thread-safe**: All traits require `Send + Sync` for use with Tokio.
//! - **Never hang the controller**: [`DoorLock::wait_closed`] may never
//!   resolve; callers bound every hardware wait with a timeout.
//!
//! # Example
//!
//! ```no_run
//! use stockroom_hardware::traits::{DoorLock, InventoryScanner};
//! use stockroom_hardware::error::Result;
//!
//! async fn visit<D: DoorLock, S: InventoryScanner>(door: &mut D, scanner: &mut S) -> Result<()> {
//!     door.unlock().await?;
//!     let before = scanner.capture_scan().await?;
//!     door.wait_closed().await?;
//!     door.lock().await?;
//!     let after = scanner.capture_scan().await?;
//!     println!("{} -> {} items", before.len(), after.len());
//!     Ok(())
//! }
//! ```
//!
//! [`DoorLock::wait_closed`]: traits::DoorLock::wait_closed

pub mod devices;
pub mod error;
pub mod manager;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use devices::{AnyCardReader, AnyDoorLock, AnyScanner};
pub use error::{HardwareError, Result};
pub use traits::{CardData, CardReader, DoorLock, InventoryScanner, MAX_UID_LENGTH, MIN_UID_LENGTH};
pub use types::{DeviceInfo, DeviceKind};

pub use manager::{PeripheralConfig, PeripheralEvent, PeripheralHandle, PeripheralManager};

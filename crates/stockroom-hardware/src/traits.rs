//! Hardware device trait definitions.
//!
//! These traits are the contract between the session pipeline and the
//! peripherals guarding the room: the card reader at the door, the door lock
//! with its close sensor, and the inventory scanner inside the room.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::{HardwareError, Result};
use crate::types::DeviceInfo;
use stockroom_core::{CardId, InventoryItemRecord};

/// Minimum UID length in bytes (per ISO 14443 specification).
pub const MIN_UID_LENGTH: usize = 4;

/// Maximum UID length in bytes (per ISO 14443 specification).
pub const MAX_UID_LENGTH: usize = 10;

/// Raw card read.
///
/// Contains the unique identifier (UID) of a presented card and the time
/// of the read.
#[derive(Debug, Clone)]
pub struct CardData {
    /// Card unique identifier (4-10 bytes).
    pub uid: Vec<u8>,

    /// Timestamp when the card was read.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl CardData {
    /// Create new card data with the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID length is not within the valid range
    /// of 4-10 bytes as specified by ISO 14443.
    ///
    /// # Examples
    ///
    /// ```
    /// use stockroom_hardware::traits::CardData;
    ///
    /// let card = CardData::new(vec![0x04, 0xAB, 0xCD, 0xEF]).unwrap();
    /// assert_eq!(card.uid_hex(), "04ABCDEF");
    /// ```
    pub fn new(uid: Vec<u8>) -> Result<Self> {
        CardDataBuilder::new(uid).build()
    }

    /// Create a builder for constructing card data with optional fields.
    pub fn builder(uid: Vec<u8>) -> CardDataBuilder {
        CardDataBuilder::new(uid)
    }

    /// Get the UID as a hexadecimal string.
    pub fn uid_hex(&self) -> String {
        self.uid.iter().map(|b| format!("{:02X}", b)).collect()
    }

    /// Credential identifier of this card.
    ///
    /// # Errors
    ///
    /// Returns an error if the hex UID is not a valid card identifier.
    pub fn card_id(&self) -> stockroom_core::Result<CardId> {
        CardId::new(&self.uid_hex())
    }
}

/// Builder for constructing CardData with optional fields.
///
/// ```
/// use stockroom_hardware::traits::CardData;
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 30, 0).unwrap();
/// let card = CardData::builder(vec![0x01, 0x02, 0x03, 0x04])
///     .timestamp(at)
///     .build()
///     .unwrap();
/// assert_eq!(card.timestamp, at);
/// ```
#[derive(Debug, Clone)]
pub struct CardDataBuilder {
    uid: Vec<u8>,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl CardDataBuilder {
    pub fn new(uid: Vec<u8>) -> Self {
        Self {
            uid,
            timestamp: None,
        }
    }

    /// Set a custom timestamp for the card read event.
    ///
    /// If not set, the current time will be used when build() is called.
    pub fn timestamp(mut self, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build the CardData instance with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID length is not between `MIN_UID_LENGTH`
    /// and `MAX_UID_LENGTH`.
    pub fn build(self) -> Result<CardData> {
        let uid_len = self.uid.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&uid_len) {
            return Err(HardwareError::invalid_data(format!(
                "Card UID length must be between {} and {} bytes, got {}",
                MIN_UID_LENGTH, MAX_UID_LENGTH, uid_len
            )));
        }

        Ok(CardData {
            uid: self.uid,
            timestamp: self.timestamp.unwrap_or_else(chrono::Utc::now),
        })
    }
}

/// Proximity card reader at the room entrance.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. For dynamic dispatch use
/// [`AnyCardReader`](crate::devices::AnyCardReader).
///
/// ```no_run
/// use stockroom_hardware::traits::CardReader;
/// use stockroom_hardware::error::Result;
///
/// async fn wait_for_card<R: CardReader>(reader: &mut R) -> Result<String> {
///     let card = reader.read_card().await?;
///     Ok(card.uid_hex())
/// }
/// ```
pub trait CardReader: Send + Sync {
    /// Wait for the next card presentation.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is disconnected or the card cannot
    /// be read.
    async fn read_card(&mut self) -> Result<CardData>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}

/// Door lock actuator with its close sensor.
pub trait DoorLock: Send + Sync {
    /// Release the lock.
    async fn unlock(&mut self) -> Result<()>;

    /// Engage the lock.
    async fn lock(&mut self) -> Result<()>;

    /// Resolve when the door-close sensor fires after the last unlock.
    ///
    /// This may never resolve if the door is held open; callers bound it
    /// with a timeout.
    async fn wait_closed(&mut self) -> Result<()>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}

/// In-room inventory scanner (shelf RFID antennas, weight sensors, ...).
pub trait InventoryScanner: Send + Sync {
    /// Capture a full inventory snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan could not be completed. A partial scan
    /// is never returned.
    async fn capture_scan(&mut self) -> Result<Vec<InventoryItemRecord>>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}

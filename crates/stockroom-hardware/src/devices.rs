//! Enum wrappers for hardware device dispatch.
//!
//! Native `async fn` in traits (RPITIT) are not object-safe, so the
//! controller cannot hold a `Box<dyn DoorLock>`. These enums provide concrete
//! type dispatch instead, with one variant per supported driver.
//!
//! ```
//! use stockroom_hardware::devices::AnyDoorLock;
//! use stockroom_hardware::mock::MockDoor;
//!
//! let (door, _handle) = MockDoor::new();
//! let any_door = AnyDoorLock::Mock(door);
//! ```

use crate::mock::{MockCardReader, MockDoor, MockScanner};
use crate::traits::{CardReader, DoorLock, InventoryScanner};
use crate::{CardData, DeviceInfo, Result};
use stockroom_core::InventoryItemRecord;

/// Enum wrapper for card reader dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyCardReader {
    /// Mock reader for development and testing.
    Mock(MockCardReader),
}

impl CardReader for AnyCardReader {
    async fn read_card(&mut self) -> Result<CardData> {
        match self {
            Self::Mock(device) => device.read_card().await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
        }
    }
}

/// Enum wrapper for door lock dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyDoorLock {
    /// Mock door for development and testing.
    Mock(MockDoor),
}

impl DoorLock for AnyDoorLock {
    async fn unlock(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.unlock().await,
        }
    }

    async fn lock(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.lock().await,
        }
    }

    async fn wait_closed(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.wait_closed().await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
        }
    }
}

/// Enum wrapper for inventory scanner dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyScanner {
    /// Mock scanner for development and testing.
    Mock(MockScanner),
}

impl InventoryScanner for AnyScanner {
    async fn capture_scan(&mut self) -> Result<Vec<InventoryItemRecord>> {
        match self {
            Self::Mock(device) => device.capture_scan().await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
        }
    }
}

impl From<MockCardReader> for AnyCardReader {
    fn from(device: MockCardReader) -> Self {
        Self::Mock(device)
    }
}

impl From<MockDoor> for AnyDoorLock {
    fn from(device: MockDoor) -> Self {
        Self::Mock(device)
    }
}

impl From<MockScanner> for AnyScanner {
    fn from(device: MockScanner) -> Self {
        Self::Mock(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_devices_delegate_to_mocks() {
        let (reader, reader_handle) = MockCardReader::new();
        let (door, door_handle) = MockDoor::new();
        let (scanner, scanner_handle) = MockScanner::new();

        let mut reader = AnyCardReader::Mock(reader);
        let mut door = AnyDoorLock::Mock(door);
        let mut scanner = AnyScanner::Mock(scanner);

        reader_handle.present_card(vec![1, 2, 3, 4]).await.unwrap();
        assert_eq!(reader.read_card().await.unwrap().uid_hex(), "01020304");

        door.unlock().await.unwrap();
        assert!(!door_handle.is_locked());
        door_handle.close_door();
        door.wait_closed().await.unwrap();
        door.lock().await.unwrap();
        assert!(door_handle.is_locked());

        scanner_handle.set_inventory(vec![InventoryItemRecord::present("A1", "slot1")]);
        assert_eq!(scanner.capture_scan().await.unwrap().len(), 1);

        assert_eq!(door.get_info().await.unwrap().model, "MOCK-DOOR");
        assert_eq!(scanner.get_info().await.unwrap().model, "MOCK-SCANNER");
    }
}

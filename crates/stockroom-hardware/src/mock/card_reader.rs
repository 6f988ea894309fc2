//! Mock card reader implementation for testing and development.

use crate::{
    HardwareError, Result,
    traits::{CardData, CardReader},
    types::DeviceInfo,
};
use tokio::sync::mpsc;

/// Mock card reader driven by a [`MockCardReaderHandle`].
///
/// # Examples
///
/// ```
/// use stockroom_hardware::mock::MockCardReader;
/// use stockroom_hardware::traits::CardReader;
///
/// #[tokio::main]
/// async fn main() -> stockroom_hardware::Result<()> {
///     let (mut reader, handle) = MockCardReader::new();
///
///     handle.present_card(vec![0x04, 0xAB, 0xCD, 0xEF]).await?;
///
///     let card = reader.read_card().await?;
///     assert_eq!(card.uid_hex(), "04ABCDEF");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockCardReader {
    event_rx: mpsc::Receiver<ReaderEvent>,
    name: String,
}

impl MockCardReader {
    /// Create a new mock reader with the default name.
    pub fn new() -> (Self, MockCardReaderHandle) {
        Self::with_name("Mock Card Reader".to_string())
    }

    /// Create a new mock reader with a custom name.
    pub fn with_name(name: String) -> (Self, MockCardReaderHandle) {
        let (event_tx, event_rx) = mpsc::channel(32);
        (Self { event_rx, name }, MockCardReaderHandle { event_tx })
    }
}

impl CardReader for MockCardReader {
    async fn read_card(&mut self) -> Result<CardData> {
        let event = self
            .event_rx
            .recv()
            .await
            .ok_or_else(|| HardwareError::disconnected("card reader event channel closed"))?;

        match event {
            ReaderEvent::Card(card) => Ok(card),
            ReaderEvent::Fault(message) => Err(HardwareError::communication(message)),
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new(self.name.clone(), "MOCK-READER").with_firmware_version("1.0.0"))
    }
}

#[derive(Debug, Clone)]
enum ReaderEvent {
    Card(CardData),
    Fault(String),
}

/// Handle for simulating card presentations on a [`MockCardReader`].
#[derive(Debug, Clone)]
pub struct MockCardReaderHandle {
    event_tx: mpsc::Sender<ReaderEvent>,
}

impl MockCardReaderHandle {
    /// Present a card with the given UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID is malformed or the reader was dropped.
    pub async fn present_card(&self, uid: Vec<u8>) -> Result<()> {
        let card = CardData::new(uid)?;
        self.send(ReaderEvent::Card(card)).await
    }

    /// Make the next read fail with a communication error.
    pub async fn inject_fault(&self, message: impl Into<String>) -> Result<()> {
        self.send(ReaderEvent::Fault(message.into())).await
    }

    async fn send(&self, event: ReaderEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| HardwareError::disconnected("card reader event channel closed"))
    }
}

//! Mock device implementations for testing and development.
//!
//! This module provides simulated device implementations that can be controlled
//! programmatically without requiring physical hardware.

pub mod card_reader;
pub mod door;
pub mod scanner;

// Re-export commonly used types
pub use card_reader::{MockCardReader, MockCardReaderHandle};
pub use door::{MockDoor, MockDoorHandle};
pub use scanner::{MockScanner, MockScannerHandle};

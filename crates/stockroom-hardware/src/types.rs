//! Identification types shared by every peripheral driver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a driver reports about the device behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable name, e.g. "Entrance reader".
    pub name: String,

    /// Vendor model string.
    pub model: String,

    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            firmware_version: None,
        }
    }

    pub fn with_firmware_version(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.model)?;
        if let Some(version) = &self.firmware_version {
            write!(f, " fw {version}")?;
        }
        Ok(())
    }
}

/// Which peripheral an event or error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    CardReader,
    DoorLock,
    Scanner,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CardReader => "card reader",
            Self::DoorLock => "door lock",
            Self::Scanner => "inventory scanner",
        };
        f.write_str(label)
    }
}

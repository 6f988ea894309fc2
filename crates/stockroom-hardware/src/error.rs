//! Peripheral errors.
//!
//! At the controller boundary these become [`stockroom_core::Error::Hardware`];
//! the session pipeline records them as anomalies and keeps going.

pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The driver lost its device (unplugged, channel closed).
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    #[error("Communication error: {message}")]
    Communication { message: String },

    /// The device answered with something malformed.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Lock solenoid refused or failed a command.
    #[error("Actuator error: {message}")]
    Actuator { message: String },

    #[error("Scan error: {message}")]
    Scan { message: String },
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn actuator(message: impl Into<String>) -> Self {
        Self::Actuator {
            message: message.into(),
        }
    }

    pub fn scan(message: impl Into<String>) -> Self {
        Self::Scan {
            message: message.into(),
        }
    }
}

impl From<HardwareError> for stockroom_core::Error {
    fn from(error: HardwareError) -> Self {
        stockroom_core::Error::Hardware(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            HardwareError::disconnected("door sensor").to_string(),
            "Device disconnected: door sensor"
        );
        assert_eq!(
            HardwareError::scan("antenna fault").to_string(),
            "Scan error: antenna fault"
        );
    }

    #[test]
    fn test_hardware_errors_are_not_fatal() {
        let core: stockroom_core::Error = HardwareError::actuator("jammed").into();
        assert!(matches!(core, stockroom_core::Error::Hardware(ref m) if m.contains("jammed")));
        assert!(!core.is_fatal());
    }
}

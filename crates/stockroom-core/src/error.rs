use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Session errors
    #[error("Invalid credential {card_id}: {reason}")]
    InvalidCredential { card_id: String, reason: String },

    #[error("Hardware timeout after {duration_ms}ms waiting for {operation}")]
    HardwareTimeout { operation: String, duration_ms: u64 },

    #[error("Duplicate scan entry for item {item_id} in {side} snapshot")]
    DuplicateScanEntry { item_id: String, side: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid card format: {0}")]
    InvalidCardFormat(String),

    #[error("Hardware operation failed: {0}")]
    Hardware(String),

    // Sync errors
    #[error("Transient sync failure: {0}")]
    TransientSyncFailure(String),

    #[error("Permanent sync failure: {0}")]
    PermanentSyncFailure(String),

    // Storage errors
    #[error("Store write failed: {0}")]
    StoreWriteFailure(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for failures that must stop the controller.
    ///
    /// Only storage failures escalate: without a durable write the
    /// controller cannot prove what happened at the door.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StoreWriteFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

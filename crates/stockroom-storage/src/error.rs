use thiserror::Error;

/// Storage-specific error types for the Stockroom edge controller.
///
/// These errors represent failures in database operations, row decoding
/// and write-ahead bookkeeping. The controller treats every one of them as
/// a durability failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Snapshot or payload (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Stored value could not be decoded into a domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub(crate) fn not_found(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }
}

impl From<stockroom_core::Error> for StorageError {
    fn from(error: stockroom_core::Error) -> Self {
        Self::Corrupt(error.to_string())
    }
}

impl From<StorageError> for stockroom_core::Error {
    fn from(error: StorageError) -> Self {
        stockroom_core::Error::StoreWriteFailure(error.to_string())
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

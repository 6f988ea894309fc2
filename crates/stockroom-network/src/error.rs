use thiserror::Error;

/// Failure of one upload attempt, classified by what the caller should do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// Network error, timeout, or a server status worth retrying
    /// (408, 429, 5xx).
    #[error("transient upload failure: {0}")]
    Transient(String),

    /// The server rejected the payload. Retrying cannot help.
    #[error("permanent upload failure: {0}")]
    Permanent(String),
}

impl UploadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UploadError::Transient(_))
    }

    /// Human-readable cause without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            UploadError::Transient(msg) | UploadError::Permanent(msg) => msg,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            UploadError::Permanent(e.to_string())
        } else {
            // Connect errors, timeouts and broken bodies all mean the server
            // may never have seen the request.
            UploadError::Transient(e.to_string())
        }
    }
}

impl From<UploadError> for stockroom_core::Error {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::Transient(msg) => stockroom_core::Error::TransientSyncFailure(msg),
            UploadError::Permanent(msg) => stockroom_core::Error::PermanentSyncFailure(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_classification() {
        let core: stockroom_core::Error = UploadError::Transient("503".into()).into();
        assert!(matches!(core, stockroom_core::Error::TransientSyncFailure(_)));

        let core: stockroom_core::Error = UploadError::Permanent("400".into()).into();
        assert!(matches!(core, stockroom_core::Error::PermanentSyncFailure(_)));
        assert!(!core.is_fatal());
    }

    #[test]
    fn test_message_strips_prefix() {
        let error = UploadError::Permanent("422 Unprocessable Entity".into());
        assert_eq!(error.message(), "422 Unprocessable Entity");
        assert_eq!(
            error.to_string(),
            "permanent upload failure: 422 Unprocessable Entity"
        );
    }
}

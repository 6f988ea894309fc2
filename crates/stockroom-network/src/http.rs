//! HTTP uploader for the remote inventory server.
//!
//! Each queue payload is one JSON `POST`:
//!
//! ```text
//! UploadRequest::Session  ──POST──>  {base_url}/sessions
//! UploadRequest::Changes  ──POST──>  {base_url}/changes
//! ```
//!
//! Every request carries an `Idempotency-Key` header holding the payload's
//! stable `upload_id`, so a resend after a lost acknowledgement is applied
//! at most once. The uploader does not retry; the sync engine owns that.
//!
//! # Status mapping
//!
//! | Response | Result |
//! |---|---|
//! | 2xx, 409 Conflict (already applied) | `Ok` |
//! | 408, 429, 5xx, connect error, timeout | `Transient` |
//! | any other status | `Permanent` |

use crate::error::UploadError;
use crate::uploader::Uploader;
use reqwest::StatusCode;
use std::time::Duration;
use stockroom_core::constants::DEFAULT_UPLOAD_TIMEOUT_MS;
use stockroom_core::{Error, Result, UploadRequest};
use tracing::{debug, warn};

/// Header carrying the payload's stable identifier.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Configuration for [`HttpUploader`].
///
/// ```
/// use stockroom_network::HttpUploaderConfig;
/// use std::time::Duration;
///
/// let config = HttpUploaderConfig::new("https://inventory.example.com/api/v1")
///     .timeout(Duration::from_secs(5));
/// assert_eq!(config.timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUploaderConfig {
    /// Base URL; endpoint paths are appended to it.
    pub base_url: String,

    /// Timeout for one request, connect included.
    pub timeout: Duration,
}

impl Default for HttpUploaderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/v1".to_string(),
            timeout: Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS),
        }
    }
}

impl HttpUploaderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`Uploader`] that talks JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    base_url: String,
    http: reqwest::Client,
}

impl HttpUploader {
    /// Build the uploader.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the base URL is empty or the HTTP client
    /// cannot be created.
    pub fn new(config: HttpUploaderConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("server base URL is empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("stockroom-edge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint receiving the given payload kind.
    pub fn endpoint(&self, request: &UploadRequest) -> String {
        match request {
            UploadRequest::Session(_) => format!("{}/sessions", self.base_url),
            UploadRequest::Changes(_) => format!("{}/changes", self.base_url),
        }
    }
}

impl Uploader for HttpUploader {
    async fn upload(&self, request: &UploadRequest) -> std::result::Result<(), UploadError> {
        let url = self.endpoint(request);
        let upload_id = request.upload_id();

        let response = self
            .http
            .post(&url)
            .header(IDEMPOTENCY_HEADER, &upload_id)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let outcome = classify_status(status);

        match &outcome {
            Ok(()) if status == StatusCode::CONFLICT => {
                debug!(%upload_id, "Upload already applied on server");
            }
            Ok(()) => debug!(%upload_id, %status, "Upload accepted"),
            Err(e) => {
                let body = response.text().await.unwrap_or_default();
                warn!(%upload_id, %status, body = %body, error = %e, "Upload rejected");
            }
        }

        outcome
    }
}

/// Map a response status to an upload result.
pub fn classify_status(status: StatusCode) -> std::result::Result<(), UploadError> {
    if status.is_success() || status == StatusCode::CONFLICT {
        return Ok(());
    }

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return Err(UploadError::Transient(status.to_string()));
    }

    Err(UploadError::Permanent(status.to_string()))
}

#![allow(async_fn_in_trait)]

use crate::error::UploadError;
use crate::http::HttpUploader;
use crate::mock::MockUploader;
use stockroom_core::UploadRequest;

/// Delivers one queue payload to the remote server.
///
/// Implementations must be safe to call again with the same request: the
/// sync engine resends after timeouts and crashes, and the request's
/// `upload_id` is what lets the server deduplicate.
pub trait Uploader: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> Result<(), UploadError>;
}

/// Uploader selected at startup.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyUploader {
    Http(HttpUploader),
    Mock(MockUploader),
}

impl Uploader for AnyUploader {
    async fn upload(&self, request: &UploadRequest) -> Result<(), UploadError> {
        match self {
            AnyUploader::Http(uploader) => uploader.upload(request).await,
            AnyUploader::Mock(uploader) => uploader.upload(request).await,
        }
    }
}

impl From<HttpUploader> for AnyUploader {
    fn from(uploader: HttpUploader) -> Self {
        AnyUploader::Http(uploader)
    }
}

impl From<MockUploader> for AnyUploader {
    fn from(uploader: MockUploader) -> Self {
        AnyUploader::Mock(uploader)
    }
}

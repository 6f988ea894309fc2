//! Remote upload layer for the Stockroom edge controller.
//!
//! The sync engine hands each claimed queue payload to an [`Uploader`] and
//! acts on the classified result:
//!
//! - **HttpUploader**: JSON over HTTP with an `Idempotency-Key` header
//! - **MockUploader**: Idempotent in-process server for tests and demos
//! - **AnyUploader**: Enum dispatch over both, chosen at startup
//!
//! # Example
//!
//! ```no_run
//! use stockroom_core::{CardId, Session, UploadRequest};
//! use stockroom_network::{HttpUploader, HttpUploaderConfig, Uploader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let uploader = HttpUploader::new(HttpUploaderConfig::new("http://127.0.0.1:8000/api/v1"))?;
//!
//! let session = Session::start(CardId::new("04ABCDEF")?);
//! for request in UploadRequest::plan(&session, &[], 100) {
//!     match uploader.upload(&request).await {
//!         Ok(()) => println!("{} confirmed", request.upload_id()),
//!         Err(e) if e.is_transient() => println!("retry later: {e}"),
//!         Err(e) => println!("needs an operator: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod mock;
pub mod uploader;

pub use error::UploadError;
pub use http::{HttpUploader, HttpUploaderConfig, IDEMPOTENCY_HEADER, classify_status};
pub use mock::{MockResponse, MockUploader, UploadAttempt};
pub use uploader::{AnyUploader, Uploader};

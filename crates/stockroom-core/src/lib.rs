//! Core domain types for the Stockroom edge controller.
//!
//! This crate has no I/O. It holds the vocabulary shared by every other
//! crate in the workspace: card and session identifiers, inventory records,
//! the session state and sync status enums, the error taxonomy, and the
//! scan differencing engine that turns two inventory snapshots into an
//! ordered list of [`ChangeRecord`]s.

pub mod constants;
pub mod diff;
pub mod error;
pub mod sync;
pub mod types;

pub use diff::{SnapshotSide, diff_snapshots};
pub use error::{Error, Result};
pub use sync::{ChangeBatch, SessionUpload, UploadRequest};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Controller-wide constants.
//!
//! Defaults here are used by the typed configuration structs in the
//! storage, controller and network crates; deployments override them through
//! the TOML configuration file.
//!
//! ```
//! use stockroom_core::constants::*;
//! use std::time::Duration;
//!
//! let door_timeout = Duration::from_secs(DEFAULT_DOOR_OPEN_TIMEOUT_SECS);
//! assert_eq!(door_timeout.as_secs(), 30);
//! ```

// ============================================================================
// Credentials
// ============================================================================

/// Minimum card identifier length after normalization.
pub const MIN_CARD_LENGTH: usize = 4;

/// Maximum card identifier length after normalization.
///
/// A 10-byte ISO 14443 UID renders as 20 hex characters; the extra room
/// covers vendor prefixes.
pub const MAX_CARD_LENGTH: usize = 32;

// ============================================================================
// Session timing
// ============================================================================

/// How long the door may stay open before the session is forced into
/// PROCESSING and flagged anomalous.
pub const DEFAULT_DOOR_OPEN_TIMEOUT_SECS: u64 = 30;

/// Attempts made at capturing an inventory scan before giving up.
pub const DEFAULT_SCAN_ATTEMPTS: u32 = 3;

/// Upper bound on a single scan capture.
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 10;

/// Grace period granted to an in-flight session during shutdown. Covers the
/// default worst case of six scan timeouts plus the door timeout.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 100;

// ============================================================================
// Sync
// ============================================================================

/// Interval between sync queue polls.
pub const DEFAULT_SYNC_POLL_INTERVAL_MS: u64 = 5_000;

/// Maximum entries claimed per poll.
pub const DEFAULT_SYNC_BATCH_SIZE: u32 = 20;

/// Maximum change records carried by a single upload.
pub const DEFAULT_CHANGES_PER_UPLOAD: usize = 100;

/// First retry delay after a transient failure.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;

/// Retry delay ceiling.
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;

/// Growth factor between consecutive retry delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Symmetric randomization of each retry delay, as a fraction of the delay.
pub const DEFAULT_JITTER_RATIO: f64 = 0.25;

/// Timeout for one upload request.
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Admin surface
// ============================================================================

/// Service name reported by the admin root endpoint.
pub const SERVICE_NAME: &str = "Smart Lab Inventory - Edge Controller";

/// Default admin HTTP bind address.
pub const DEFAULT_ADMIN_BIND: &str = "0.0.0.0:8080";

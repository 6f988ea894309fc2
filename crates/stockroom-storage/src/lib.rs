//! Durable storage for the Stockroom edge controller.
//!
//! SQLite (through `sqlx`) is the controller's only source of truth until
//! the remote server confirms an upload. This crate owns the schema, the
//! write-ahead session records, the sync queue and the local card table.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool with WAL journal, `synchronous = FULL`
//!   and embedded migrations
//! - [`DurableStore`] / [`SqliteStore`] - The contract used by the
//!   controller; every write is a single transaction
//! - [`transaction`] - Transaction-scoped writes the store composes
//! - [`repositories`] - Read access per table
//! - [`LocalCardValidator`] - Offline card validation with an audit trail
//!
//! # Sync queue semantics
//!
//! Entries of one session upload in `seq` order: an entry is claimable only
//! once every earlier entry of its session is confirmed. A session's
//! `sync_status` is derived from its entries after every claim and outcome.
//!
//! ```no_run
//! use chrono::Utc;
//! use stockroom_storage::{DatabaseConfig, DurableStore, SqliteStore, SyncOutcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open(DatabaseConfig::new("stockroom.db")).await?;
//!
//! for entry in store.dequeue_ready_sync(Utc::now(), 20).await? {
//!     // upload entry.payload, then:
//!     store.mark_sync_result(entry.entry_id, SyncOutcome::Confirmed).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;
pub mod transaction;
pub mod validator;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{
    AccessAttempt, AuthorizedCard, NewSyncEntry, SessionUpdate, SyncCounts, SyncOutcome,
    SyncQueueEntry,
};
pub use repositories::{
    AccessAttemptRepository, CardRepository, SessionRepository, SqliteAccessAttemptRepository,
    SqliteCardRepository, SqliteSessionRepository, SqliteSyncQueueRepository,
    SyncQueueRepository,
};
pub use store::{DurableStore, SqliteStore};
pub use validator::{DenyReason, LocalCardValidator, ValidationOutcome};

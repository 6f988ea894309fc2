pub mod access_attempt;
pub mod card;
pub mod session;
pub mod sync_queue;

pub use access_attempt::{AccessAttemptRepository, SqliteAccessAttemptRepository};
pub use card::{CardRepository, SqliteCardRepository};
pub use session::{SessionRepository, SqliteSessionRepository};
pub use sync_queue::{SqliteSyncQueueRepository, SyncQueueRepository};

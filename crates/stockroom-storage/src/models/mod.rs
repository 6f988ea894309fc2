pub mod access_attempt;
pub mod card;
pub mod change_record;
pub mod session;
pub mod sync_entry;
pub mod temporal_validity;

pub use access_attempt::AccessAttempt;
pub use card::AuthorizedCard;
pub use change_record::ChangeRecordRow;
pub use session::{SessionRow, SessionUpdate};
pub use sync_entry::{NewSyncEntry, SyncCounts, SyncEntryRow, SyncOutcome, SyncQueueEntry};
pub use temporal_validity::{TemporalValidity, Validity};

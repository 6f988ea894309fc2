use crate::error::{StorageError, StorageResult};
use stockroom_core::{ChangeRecord, ItemId};

/// Raw `change_records` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChangeRecordRow {
    pub change_id: String,
    pub session_id: String,
    pub item_id: String,
    pub kind: String,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
}

impl TryFrom<ChangeRecordRow> for ChangeRecord {
    type Error = StorageError;

    fn try_from(row: ChangeRecordRow) -> StorageResult<Self> {
        Ok(ChangeRecord {
            change_id: row.change_id,
            session_id: row.session_id.parse()?,
            item_id: ItemId::new(row.item_id),
            kind: row.kind.parse()?,
            from_location: row.from_location,
            to_location: row.to_location,
        })
    }
}

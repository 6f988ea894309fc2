//! Scan differencing engine.
//!
//! Turns a before/after pair of inventory snapshots into the minimal list of
//! item-level changes. Output is sorted by item identifier so that the same
//! input always produces the same records, which the idempotent sync path
//! depends on.
//!
//! ```
//! use stockroom_core::{ChangeKind, InventoryItemRecord, SessionId, diff_snapshots};
//!
//! let before = vec![InventoryItemRecord::present("A1", "slot1")];
//! let after = vec![InventoryItemRecord::present("A1", "slot2")];
//!
//! let changes = diff_snapshots(SessionId::generate(), &before, &after).unwrap();
//! assert_eq!(changes.len(), 1);
//! assert_eq!(changes[0].kind, ChangeKind::Moved);
//! ```

use crate::{
    Result,
    error::Error,
    types::{ChangeKind, ChangeRecord, InventoryItemRecord, ItemId, SessionId},
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which snapshot of a session a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSide {
    Before,
    After,
}

impl fmt::Display for SnapshotSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SnapshotSide::Before => f.write_str("before"),
            SnapshotSide::After => f.write_str("after"),
        }
    }
}

/// Item id to location, `None` when the scanner reported the item absent.
type LocationIndex<'a> = BTreeMap<&'a ItemId, Option<&'a str>>;

fn index(records: &[InventoryItemRecord], side: SnapshotSide) -> Result<LocationIndex<'_>> {
    let mut map = BTreeMap::new();
    for record in records {
        let location = record.is_present().then_some(record.location.as_str());
        if map.insert(&record.item_id, location).is_some() {
            return Err(Error::DuplicateScanEntry {
                item_id: record.item_id.to_string(),
                side: side.to_string(),
            });
        }
    }
    Ok(map)
}

/// Compute the change records between two snapshots of one session.
///
/// # Errors
/// Returns `Error::DuplicateScanEntry` if either snapshot lists the same
/// item identifier twice. The engine never guesses which entry wins.
pub fn diff_snapshots(
    session_id: SessionId,
    before: &[InventoryItemRecord],
    after: &[InventoryItemRecord],
) -> Result<Vec<ChangeRecord>> {
    let before = index(before, SnapshotSide::Before)?;
    let after = index(after, SnapshotSide::After)?;

    let ids: BTreeSet<&ItemId> = before.keys().chain(after.keys()).copied().collect();

    let mut changes = Vec::new();
    for id in ids {
        let was = before.get(id).copied().flatten();
        let now = after.get(id).copied().flatten();

        let kind = match (was, now) {
            (Some(from), Some(to)) if from != to => ChangeKind::Moved,
            (Some(_), None) => ChangeKind::Removed,
            (None, Some(_)) => ChangeKind::Added,
            _ => continue,
        };

        changes.push(ChangeRecord::new(
            session_id,
            id.clone(),
            kind,
            was.map(str::to_string),
            now.map(str::to_string),
        ));
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemPresence;

    fn item(id: &str, loc: &str) -> InventoryItemRecord {
        InventoryItemRecord::present(id, loc)
    }

    fn absent(id: &str) -> InventoryItemRecord {
        InventoryItemRecord {
            presence: ItemPresence::Absent,
            ..InventoryItemRecord::present(id, "")
        }
    }

    #[test]
    fn test_moved_item() {
        let session_id = SessionId::generate();
        let changes =
            diff_snapshots(session_id, &[item("A1", "slot1")], &[item("A1", "slot2")]).unwrap();

        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.item_id.as_str(), "A1");
        assert_eq!(change.kind, ChangeKind::Moved);
        assert_eq!(change.from_location.as_deref(), Some("slot1"));
        assert_eq!(change.to_location.as_deref(), Some("slot2"));
        assert_eq!(change.session_id, session_id);
    }

    #[test]
    fn test_added_removed_and_unchanged() {
        let before = vec![item("B2", "s2"), item("A1", "s1")];
        let after = vec![item("A1", "s1"), item("C3", "s3")];

        let changes = diff_snapshots(SessionId::generate(), &before, &after).unwrap();
        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.item_id.as_str(), c.kind))
            .collect();

        assert_eq!(
            summary,
            vec![("B2", ChangeKind::Removed), ("C3", ChangeKind::Added)]
        );
        assert_eq!(changes[0].to_location, None);
        assert_eq!(changes[1].from_location, None);
    }

    #[test]
    fn test_output_sorted_by_item_id() {
        let after = vec![item("Z9", "a"), item("M5", "b"), item("A0", "c")];
        let changes = diff_snapshots(SessionId::generate(), &[], &after).unwrap();
        let ids: Vec<_> = changes.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["A0", "M5", "Z9"]);
    }

    #[test]
    fn test_duplicate_in_before_is_rejected() {
        let before = vec![item("A1", "slot1"), item("A1", "slot2")];
        let err = diff_snapshots(SessionId::generate(), &before, &[]).unwrap_err();
        match err {
            Error::DuplicateScanEntry { item_id, side } => {
                assert_eq!(item_id, "A1");
                assert_eq!(side, "before");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_in_after_is_rejected() {
        let after = vec![item("A1", "slot1"), absent("A1")];
        let err = diff_snapshots(SessionId::generate(), &[], &after).unwrap_err();
        assert!(matches!(err, Error::DuplicateScanEntry { side, .. } if side == "after"));
    }

    #[test]
    fn test_absent_records_count_as_missing() {
        let before = vec![item("A1", "slot1"), absent("B2")];
        let after = vec![absent("A1"), item("B2", "slot4")];

        let changes = diff_snapshots(SessionId::generate(), &before, &after).unwrap();
        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.item_id.as_str(), c.kind))
            .collect();
        assert_eq!(
            summary,
            vec![("A1", ChangeKind::Removed), ("B2", ChangeKind::Added)]
        );
    }

    #[test]
    fn test_absent_on_both_sides_is_no_change() {
        let changes =
            diff_snapshots(SessionId::generate(), &[absent("A1")], &[absent("A1")]).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_empty_snapshots() {
        assert!(diff_snapshots(SessionId::generate(), &[], &[]).unwrap().is_empty());
    }
}

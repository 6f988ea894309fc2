//! Property tests for the scan differencing engine.

use proptest::collection::btree_map;
use proptest::prelude::*;
use stockroom_core::{ChangeKind, InventoryItemRecord, SessionId, diff_snapshots};

/// Snapshot with unique item ids drawn from a small alphabet so that
/// before/after pairs overlap often.
fn snapshot() -> impl Strategy<Value = Vec<InventoryItemRecord>> {
    btree_map("[A-F][0-9]", "slot[0-4]", 0..24).prop_map(|items| {
        items
            .into_iter()
            .map(|(id, slot)| InventoryItemRecord::present(id, slot))
            .collect()
    })
}

proptest! {
    #[test]
    fn self_diff_is_empty(before in snapshot()) {
        let changes = diff_snapshots(SessionId::generate(), &before, &before).unwrap();
        prop_assert!(changes.is_empty());
    }

    #[test]
    fn diff_is_deterministic(before in snapshot(), after in snapshot()) {
        let session_id = SessionId::generate();
        let first = diff_snapshots(session_id, &before, &after).unwrap();
        let second = diff_snapshots(session_id, &before, &after).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn diff_is_independent_of_input_order(before in snapshot(), after in snapshot()) {
        let session_id = SessionId::generate();
        let forward = diff_snapshots(session_id, &before, &after).unwrap();

        let mut reversed_before = before.clone();
        reversed_before.reverse();
        let mut reversed_after = after.clone();
        reversed_after.reverse();
        let reversed = diff_snapshots(session_id, &reversed_before, &reversed_after).unwrap();

        prop_assert_eq!(forward, reversed);
    }

    #[test]
    fn output_is_strictly_sorted(before in snapshot(), after in snapshot()) {
        let changes = diff_snapshots(SessionId::generate(), &before, &after).unwrap();
        prop_assert!(changes.windows(2).all(|w| w[0].item_id < w[1].item_id));
    }

    #[test]
    fn reverse_diff_swaps_added_and_removed(before in snapshot(), after in snapshot()) {
        let session_id = SessionId::generate();
        let forward = diff_snapshots(session_id, &before, &after).unwrap();
        let backward = diff_snapshots(session_id, &after, &before).unwrap();

        prop_assert_eq!(forward.len(), backward.len());
        for (f, b) in forward.iter().zip(&backward) {
            let expected = match f.kind {
                ChangeKind::Added => ChangeKind::Removed,
                ChangeKind::Removed => ChangeKind::Added,
                ChangeKind::Moved => ChangeKind::Moved,
            };
            prop_assert_eq!(b.kind, expected);
            prop_assert_eq!(&b.from_location, &f.to_location);
        }
    }
}

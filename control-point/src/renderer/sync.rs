//! Aligning the local queue with the renderer's id array.
//!
//! Rows that survive keep their metadata: ids that disappeared are deleted,
//! ids that moved are moved, and only ids never seen before become
//! placeholder rows whose metadata must be read.

use std::collections::HashSet;

use crate::content::{ContentTree, MusicTrack, Node, TreeModel};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Ids that got a placeholder row, in queue order
    pub unknown: Vec<u32>,
    /// The queue was rebuilt from scratch
    pub reset: bool,
}

/// Whether `ids` repeats an id. Such an array is rejected.
pub fn has_duplicates(ids: &[u32]) -> bool {
    let mut seen = HashSet::with_capacity(ids.len());
    !ids.iter().all(|id| seen.insert(*id))
}

fn placeholder(id: u32) -> Node {
    Node::track(MusicTrack::default(), id.to_string())
}

/// Make the children of the queue root (mirrored by `ids`) equal `new`.
pub fn sync_queue(tree: &mut ContentTree, ids: &mut Vec<u32>, new: &[u32]) -> SyncOutcome {
    let root = tree.root();

    if ids.is_empty() || new.is_empty() {
        tree.remove_children(root);
        tree.append(root, new.iter().map(|id| placeholder(*id)).collect());
        *ids = new.to_vec();
        return SyncOutcome {
            unknown: new.to_vec(),
            reset: true,
        };
    }

    let wanted: HashSet<u32> = new.iter().copied().collect();
    for row in (0..ids.len()).rev() {
        if !wanted.contains(&ids[row]) {
            tree.remove_row(root, row);
            ids.remove(row);
        }
    }

    let mut unknown = Vec::new();
    for (pos, id) in new.iter().enumerate() {
        if ids.get(pos) == Some(id) {
            continue;
        }
        match ids[pos..].iter().position(|x| x == id) {
            Some(offset) => {
                let from = pos + offset;
                tree.move_row(root, from, pos);
                let moved = ids.remove(from);
                ids.insert(pos, moved);
            }
            None => {
                tree.insert(root, pos, placeholder(*id));
                ids.insert(pos, *id);
                unknown.push(*id);
            }
        }
    }

    debug_assert_eq!(ids.as_slice(), new);
    SyncOutcome {
        unknown,
        reset: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentKind, ModelEvent, TreeRole};
    use proptest::prelude::*;

    fn queue() -> ContentTree {
        ContentTree::new(TreeRole::Queue, Node::collection(ContentKind::Playlist, "Queue", ""))
    }

    fn row_ids(tree: &ContentTree) -> Vec<u32> {
        tree.children(tree.root())
            .iter()
            .map(|c| tree.get(*c).unwrap().object_id.parse().unwrap())
            .collect()
    }

    fn seeded(initial: &[u32]) -> (ContentTree, Vec<u32>) {
        let mut tree = queue();
        let mut ids = Vec::new();
        sync_queue(&mut tree, &mut ids, initial);
        tree.take_events();
        (tree, ids)
    }

    #[test]
    fn test_initial_sync_is_a_reset() {
        let mut tree = queue();
        let mut ids = Vec::new();
        let outcome = sync_queue(&mut tree, &mut ids, &[5, 6, 7]);
        assert!(outcome.reset);
        assert_eq!(outcome.unknown, vec![5, 6, 7]);
        assert_eq!(row_ids(&tree), vec![5, 6, 7]);
    }

    #[test]
    fn test_pure_reorder_moves_without_reads() {
        let (mut tree, mut ids) = seeded(&[5, 6, 7]);
        let seven = tree.children(tree.root())[2];

        let outcome = sync_queue(&mut tree, &mut ids, &[6, 5, 7]);
        assert!(outcome.unknown.is_empty());
        assert!(!outcome.reset);
        assert_eq!(ids, vec![6, 5, 7]);
        assert_eq!(row_ids(&tree), vec![6, 5, 7]);
        // the untouched row keeps its handle
        assert_eq!(tree.children(tree.root())[2], seven);

        let root = tree.root();
        assert_eq!(
            tree.take_events(),
            vec![ModelEvent::Moved {
                parent: root,
                from: 1,
                to: 0
            }]
        );
    }

    #[test]
    fn test_removals_insertions_and_moves_together() {
        let (mut tree, mut ids) = seeded(&[1, 2, 3, 4]);
        let outcome = sync_queue(&mut tree, &mut ids, &[4, 9, 2, 1]);
        assert_eq!(outcome.unknown, vec![9]);
        assert_eq!(row_ids(&tree), vec![4, 9, 2, 1]);
    }

    #[test]
    fn test_emptying_resets() {
        let (mut tree, mut ids) = seeded(&[1, 2]);
        let outcome = sync_queue(&mut tree, &mut ids, &[]);
        assert!(outcome.reset);
        assert!(ids.is_empty());
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn test_duplicates_detected() {
        assert!(has_duplicates(&[1, 2, 1]));
        assert!(!has_duplicates(&[1, 2, 3]));
    }

    fn unique_ids() -> impl Strategy<Value = Vec<u32>> {
        proptest::collection::hash_set(1u32..40, 0..20)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    }

    proptest! {
        #[test]
        fn prop_sync_reaches_target_and_is_idempotent(old in unique_ids(), new in unique_ids()) {
            let (mut tree, mut ids) = seeded(&old);
            let first = sync_queue(&mut tree, &mut ids, &new);
            prop_assert_eq!(&ids, &new);
            prop_assert_eq!(row_ids(&tree), new.clone());

            let known: HashSet<u32> = old.iter().copied().collect();
            if !first.reset {
                prop_assert!(first.unknown.iter().all(|id| !known.contains(id)));
            }

            tree.take_events();
            let second = sync_queue(&mut tree, &mut ids, &new);
            if !new.is_empty() {
                prop_assert!(second.unknown.is_empty());
                prop_assert!(tree.take_events().is_empty());
            }
        }
    }
}

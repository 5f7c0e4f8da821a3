//! Post-load repair of the right edge.
//!
//! After a bulk load every node off the rightmost path is full, but the
//! nodes on that path can be short of keys and short of children. Repair
//! runs in two phases.
//!
//! Phase A completes the structure. Walking down the right spine (the root
//! is exempt), every internal node with `k < min_keys` keys gets empty
//! placeholder subtrees at child slots `k + 1 ..= min_keys`, so it has the
//! minimum number of children. Placeholders are themselves minimal: leaves
//! are empty, internal placeholders get `min_keys + 1` placeholder children.
//!
//! Phase B moves keys. A writer walks the repaired shape in reverse in-order
//! and fills every slot with the greatest key a `KeyProvider` has not yet
//! handed out. Internal nodes end up with `children - 1` keys, leaves with
//! `max(min_keys, unread)` where `unread` is what is left of the leaf's own
//! keys when the writer reaches it. Keys only ever move right, so the writer
//! never overwrites a key the provider still has to read. The writer stops
//! once the provider's next key already sits in the writer's next slot and
//! every new internal slot has been filled; from there on both layouts are
//! the same.

use crate::storage::btree::node::{Key, NULL_POINTER, Node, Pointer};
use crate::storage::btree::provider::KeyProvider;
use crate::storage::btree::store::TreeStore;
use crate::storage::btree::tree::TreeError;
use crate::storage::io::Storage;

/// What a rebalancing pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebalanceSummary {
    /// Placeholder nodes added by structural completion.
    pub nodes_created: u32,
    /// Internal key slots the placeholders and spine nodes added.
    pub new_slots: u64,
    /// Keys written during redistribution.
    pub keys_moved: u64,
    /// Node records rewritten during redistribution.
    pub nodes_rewritten: u64,
}

/// Restore minimum occupancy along the right edge of a bulk-loaded tree.
///
/// `height` counts levels including the leaves; `next_pointer` is the first
/// unused record index. Returns how many records were added, which the
/// caller must add to its own pointer counter.
pub fn rebalance<S: Storage>(
    store: &mut TreeStore<S>,
    height: usize,
    next_pointer: Pointer,
) -> Result<RebalanceSummary, TreeError> {
    let min_keys = store.min_keys();
    let mut rebalancer = Rebalancer {
        store,
        height,
        min_keys,
        next_pointer,
        summary: RebalanceSummary::default(),
    };

    if height > 1 {
        rebalancer.complete_structure()?;
        rebalancer.redistribute()?;
    }

    let summary = rebalancer.summary;
    tracing::debug!(
        nodes_created = summary.nodes_created,
        new_slots = summary.new_slots,
        keys_moved = summary.keys_moved,
        nodes_rewritten = summary.nodes_rewritten,
        "rebalanced right edge"
    );
    Ok(summary)
}

struct Rebalancer<'a, S: Storage> {
    store: &'a mut TreeStore<S>,
    height: usize,
    min_keys: usize,
    next_pointer: Pointer,
    summary: RebalanceSummary,
}

impl<S: Storage> Rebalancer<'_, S> {
    /// Phase A: give every non-root spine node at least `min_keys + 1`
    /// children.
    fn complete_structure(&mut self) -> Result<(), TreeError> {
        let root = self.store.read_node(self.store.root())?;
        let mut pointer = root.children[root.keys_count];

        // Depth 0 is the root; internal spine nodes sit above height - 1.
        for depth in 1..self.height - 1 {
            let mut node = self.store.read_node(pointer)?;
            let keys = node.keys_count;
            let spine_child = node.children[keys];

            if keys < self.min_keys {
                for slot in keys + 1..=self.min_keys {
                    node.children[slot] = self.placeholder(node.pointer, depth + 1)?;
                }
                self.summary.new_slots += (self.min_keys - keys) as u64;
                self.store.write_node(&node)?;
            }

            pointer = spine_child;
        }
        Ok(())
    }

    /// Create an empty minimal subtree rooted at `depth`, returning its root.
    fn placeholder(&mut self, parent: Pointer, depth: usize) -> Result<Pointer, TreeError> {
        let pointer = self.next_pointer;
        self.next_pointer += 1;
        self.summary.nodes_created += 1;

        let is_leaf = depth == self.height - 1;
        let mut node = Node::new(self.store.order(), pointer, parent, is_leaf);
        if !is_leaf {
            for slot in 0..=self.min_keys {
                node.children[slot] = self.placeholder(pointer, depth + 1)?;
            }
            self.summary.new_slots += self.min_keys as u64;
        }

        self.store.write_node(&node)?;
        Ok(pointer)
    }

    /// Phase B: shift keys right until every node meets its target count.
    fn redistribute(&mut self) -> Result<(), TreeError> {
        let mut provider = KeyProvider::new(self.store)?;
        let mut pending = self.summary.new_slots;
        let root = self.store.root();
        self.fill(root, 0, &mut provider, &mut pending)?;
        Ok(())
    }

    /// Fill the subtree at `pointer` from the right. Returns `true` once the
    /// remaining layout to the left is already in place.
    fn fill(
        &mut self,
        pointer: Pointer,
        depth: usize,
        provider: &mut KeyProvider,
        pending: &mut u64,
    ) -> Result<bool, TreeError> {
        if depth >= self.height {
            return Err(TreeError::Corrupted(format!(
                "node {pointer} sits below the leaf level"
            )));
        }

        let mut node = self.store.read_node(pointer)?;
        let old_count = node.keys_count;

        let done = if node.is_leaf {
            let target = self.min_keys.max(provider.unread_in(pointer));
            node.keys_count = target;
            let mut changed = target != old_count;
            let mut done = false;

            for slot in (0..target).rev() {
                if *pending == 0 && provider.position() == Some((pointer, slot)) {
                    done = true;
                    break;
                }
                node.keys[slot] = self.take(provider)?;
                changed = true;
            }

            self.persist(&node, changed)?;
            done
        } else {
            let children = node.children_count();
            if children == 0 {
                return Err(TreeError::Corrupted(format!(
                    "internal node {pointer} has no children"
                )));
            }
            let target = children - 1;
            node.keys_count = target;
            let mut changed = target != old_count;
            let mut done = false;

            for index in (0..children).rev() {
                let child = node.children[index];
                if child == NULL_POINTER {
                    return Err(TreeError::NullPointer);
                }
                if self.fill(child, depth + 1, provider, pending)? {
                    done = true;
                    break;
                }
                let Some(slot) = index.checked_sub(1) else {
                    break;
                };

                if *pending == 0 && provider.position() == Some((pointer, slot)) {
                    done = true;
                    break;
                }
                node.keys[slot] = self.take(provider)?;
                changed = true;
                if slot >= old_count {
                    *pending = pending.saturating_sub(1);
                }
            }

            self.persist(&node, changed)?;
            done
        };

        Ok(done)
    }

    fn take(&mut self, provider: &mut KeyProvider) -> Result<Key, TreeError> {
        let key = provider.next_key(self.store)?.ok_or_else(|| {
            TreeError::Corrupted("ran out of keys while redistributing".to_string())
        })?;
        self.summary.keys_moved += 1;
        Ok(key)
    }

    fn persist(&mut self, node: &Node, changed: bool) -> Result<(), TreeError> {
        if changed {
            self.store.write_node(node)?;
            self.summary.nodes_rewritten += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::storage::btree::{BulkBuilder, Tree};
    use crate::testing::key_from_u64;

    /// Bulk load `count` sequential keys and return the unbalanced store along
    /// with the builder's height and pointer counter.
    fn unbalanced(order: u32, count: u64) -> (TreeStore<MemoryStorage>, usize, Pointer) {
        let mut builder =
            BulkBuilder::create_for_bulk_load(MemoryStorage::new(), order).expect("create builder");
        for i in 0..count {
            builder.insert_sorted(key_from_u64(i)).expect("insert");
        }
        let height = builder.height();
        builder.flush_path().expect("flush path");
        let store = builder.into_store();
        let nodes = u32::try_from(store.record_count().expect("count")).expect("fits u32");
        (store, height, nodes)
    }

    fn keys_in_order(store: TreeStore<MemoryStorage>) -> Vec<Key> {
        let mut tree = Tree::open_for_lookup(store.into_inner()).expect("open tree");
        let mut keys: Vec<Key> = tree
            .keys_descending()
            .expect("iterate")
            .collect::<Result<_, _>>()
            .expect("read keys");
        keys.reverse();
        keys
    }

    #[test]
    fn test_seventeen_keys_order_three() {
        // Before: root 5 = {15} over node 1 = {3, 7, 11} and node 6 = {} whose
        // only child is leaf 7 = {16}.
        let (mut store, height, next) = unbalanced(3, 17);
        assert_eq!(height, 3);
        assert_eq!(store.root(), 5);

        let summary = rebalance(&mut store, height, next).expect("rebalance");
        assert_eq!(summary.nodes_created, 1);
        assert_eq!(summary.new_slots, 1);

        let root = store.read_node(5).expect("read root");
        assert_eq!(root.valid_keys(), &[key_from_u64(13)]);

        let right = store.read_node(6).expect("read node");
        assert_eq!(right.valid_keys(), &[key_from_u64(15)]);
        assert_eq!(&right.children[..2], &[7, 8]);

        let spine_leaf = store.read_node(7).expect("read leaf");
        assert_eq!(spine_leaf.valid_keys(), &[key_from_u64(14)]);

        let placeholder = store.read_node(8).expect("read placeholder");
        assert!(placeholder.is_leaf);
        assert_eq!(placeholder.parent, 6);
        assert_eq!(placeholder.valid_keys(), &[key_from_u64(16)]);

        let drained = store.read_node(4).expect("read leaf");
        assert_eq!(drained.valid_keys(), &[key_from_u64(12)]);

        let expected: Vec<Key> = (0..17).map(key_from_u64).collect();
        assert_eq!(keys_in_order(store), expected);
    }

    #[test]
    fn test_full_enough_right_leaf_is_untouched() {
        // Order 4, 6 keys: root {4} over {0, 1, 2, 3} and {5}; min_keys is 1.
        let (mut store, height, next) = unbalanced(4, 6);
        let summary = rebalance(&mut store, height, next).expect("rebalance");
        assert_eq!(summary.nodes_created, 0);
        assert_eq!(summary.keys_moved, 0);
        assert_eq!(summary.nodes_rewritten, 0);

        // Order 5, 8 keys: root {5} over {0..=4} and {6, 7}; min_keys is 2.
        let (mut store, height, next) = unbalanced(5, 8);
        let summary = rebalance(&mut store, height, next).expect("rebalance");
        assert_eq!(summary.keys_moved, 0);
        let root = store.read_node(store.root()).expect("read root");
        assert_eq!(root.valid_keys(), &[key_from_u64(5)]);
    }

    #[test]
    fn test_borrow_from_left_sibling() {
        // Order 5, 7 keys: root {5} over {0..=4} and {6}. The right leaf needs
        // two keys, so 5 moves down and 4 moves up.
        let (mut store, height, next) = unbalanced(5, 7);
        let summary = rebalance(&mut store, height, next).expect("rebalance");
        assert_eq!(summary.nodes_created, 0);
        assert_eq!(summary.keys_moved, 3);
        assert_eq!(summary.nodes_rewritten, 3);

        let root = store.read_node(store.root()).expect("read root");
        assert_eq!(root.valid_keys(), &[key_from_u64(4)]);
        let left = store.read_node(root.children[0]).expect("read leaf");
        assert_eq!(
            left.valid_keys(),
            &[key_from_u64(0), key_from_u64(1), key_from_u64(2), key_from_u64(3)]
        );
        let right = store.read_node(root.children[1]).expect("read leaf");
        assert_eq!(right.valid_keys(), &[key_from_u64(5), key_from_u64(6)]);
    }

    #[test]
    fn test_empty_right_leaf_borrows() {
        // Order 3, 4 keys: root {3} over {0, 1, 2} and an empty leaf.
        let (mut store, height, next) = unbalanced(3, 4);
        rebalance(&mut store, height, next).expect("rebalance");

        let root = store.read_node(store.root()).expect("read root");
        assert_eq!(root.valid_keys(), &[key_from_u64(2)]);
        let left = store.read_node(root.children[0]).expect("read leaf");
        assert_eq!(left.valid_keys(), &[key_from_u64(0), key_from_u64(1)]);
        let right = store.read_node(root.children[1]).expect("read leaf");
        assert_eq!(right.valid_keys(), &[key_from_u64(3)]);
    }

    #[test]
    fn test_order_two_is_untouched() {
        let (mut store, height, next) = unbalanced(2, 9);
        let before = store.storage().as_bytes().to_vec();

        let summary = rebalance(&mut store, height, next).expect("rebalance");
        assert_eq!(summary, RebalanceSummary::default());
        assert_eq!(store.storage().as_bytes(), before.as_slice());
    }

    #[test]
    fn test_single_leaf_is_noop() {
        let (mut store, height, next) = unbalanced(5, 2);
        assert_eq!(height, 1);
        let summary = rebalance(&mut store, height, next).expect("rebalance");
        assert_eq!(summary, RebalanceSummary::default());
    }

    #[test]
    fn test_preserves_key_sequence() {
        for order in [3u32, 4, 5, 6, 7] {
            for count in [30u64, 64, 65, 129, 250, 343, 500] {
                let (mut store, height, next) = unbalanced(order, count);
                rebalance(&mut store, height, next).expect("rebalance");

                let expected: Vec<Key> = (0..count).map(key_from_u64).collect();
                assert_eq!(
                    keys_in_order(store),
                    expected,
                    "order {order}, {count} keys"
                );
            }
        }
    }
}

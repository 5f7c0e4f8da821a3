//! Read-only access to a finalized tree.
//!
//! A lookup reads the root, binary-searches its keys and follows the child
//! pointer for the insertion index until it finds the key or runs out of
//! levels. Cost is one record read per level.

use crate::storage::btree::node::{Key, NodeError, Pointer};
use crate::storage::btree::provider::DescendingKeys;
use crate::storage::btree::store::TreeStore;
use crate::storage::io::{Storage, StorageError};

/// Upper bound on tree height. A tree of order 1 holding `u32::MAX` nodes
/// stays below it, so a longer descent means the file has a cycle.
pub const MAX_HEIGHT: usize = 64;

/// A membership index opened for lookups.
///
/// Each `Tree` owns its storage handle; concurrent readers open one `Tree`
/// per thread.
#[derive(Debug)]
pub struct Tree<S: Storage> {
    store: TreeStore<S>,
}

impl<S: Storage> Tree<S> {
    /// Open a finalized tree for lookups.
    pub fn open_for_lookup(storage: S) -> Result<Self, TreeError> {
        let store = TreeStore::open(storage)?;
        tracing::debug!(
            order = store.order(),
            root = store.root(),
            "opened index for lookup"
        );
        Ok(Self { store })
    }

    /// Check whether `key` is in the index.
    pub fn contains(&mut self, key: &Key) -> Result<bool, TreeError> {
        let mut pointer = self.store.root();

        for _ in 0..MAX_HEIGHT {
            let node = self.store.read_node(pointer)?;
            match node.search(key) {
                Ok(_) => return Ok(true),
                Err(_) if node.is_leaf => return Ok(false),
                Err(index) => pointer = node.children[index],
            }
        }

        Err(TreeError::Corrupted(format!(
            "lookup descended more than {MAX_HEIGHT} levels"
        )))
    }

    /// Check a batch of keys, answering in input order.
    pub fn contains_many<'k, I>(&mut self, keys: I) -> Result<Vec<bool>, TreeError>
    where
        I: IntoIterator<Item = &'k Key>,
    {
        keys.into_iter().map(|key| self.contains(key)).collect()
    }

    /// Iterate every key in the tree, greatest first.
    pub fn keys_descending(&mut self) -> Result<DescendingKeys<'_, S>, TreeError> {
        DescendingKeys::new(&mut self.store)
    }

    /// Maximum keys per node.
    #[must_use]
    pub const fn order(&self) -> u32 {
        self.store.order()
    }

    /// Pointer of the root node.
    #[must_use]
    pub const fn root(&self) -> Pointer {
        self.store.root()
    }

    /// Borrow the underlying record store.
    pub const fn store_mut(&mut self) -> &mut TreeStore<S> {
        &mut self.store
    }

    /// Borrow the backing storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        self.store.storage()
    }
}

/// Error type for tree operations.
#[derive(Debug)]
pub enum TreeError {
    /// Storage error.
    Storage(StorageError),
    /// Node decoding error.
    Node(NodeError),
    /// Order outside `1..=MAX_ORDER`.
    InvalidOrder(u32),
    /// A null pointer was followed.
    NullPointer,
    /// The structure is inconsistent.
    Corrupted(String),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::InvalidOrder(order) => write!(f, "invalid tree order: {order}"),
            Self::NullPointer => write!(f, "followed a null node pointer"),
            Self::Corrupted(msg) => write!(f, "corrupted tree: {msg}"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::InvalidOrder(_) | Self::NullPointer | Self::Corrupted(_) => None,
        }
    }
}

impl From<StorageError> for TreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for TreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::btree::node::{NULL_POINTER, Node};
    use crate::storage::{FileStorage, MemoryStorage};
    use crate::testing::{build_tree, key_from_u64};
    use tempfile::tempdir;

    /// Root {20, 40} over leaves {5, 10}, {25, 30}, {45, 50}, written by hand.
    fn hand_built_tree() -> MemoryStorage {
        let order = 3;
        let mut store = TreeStore::create(MemoryStorage::new(), order).expect("create store");

        let mut root = Node::new(order, 3, NULL_POINTER, false);
        root.push_key(key_from_u64(20));
        root.push_key(key_from_u64(40));
        root.children[..3].copy_from_slice(&[0, 1, 2]);

        for (pointer, keys) in [(0, [5, 10]), (1, [25, 30]), (2, [45, 50])] {
            let mut leaf = Node::new(order, pointer, 3, true);
            for k in keys {
                leaf.push_key(key_from_u64(k));
            }
            store.write_node(&leaf).expect("write leaf");
        }
        store.write_node(&root).expect("write root");
        store.set_root(3).expect("set root");
        store.into_inner()
    }

    #[test]
    fn test_lookup_hand_built() {
        let mut tree = Tree::open_for_lookup(hand_built_tree()).expect("open tree");

        for present in [5, 10, 20, 25, 30, 40, 45, 50] {
            assert!(
                tree.contains(&key_from_u64(present)).expect("lookup"),
                "{present} should be present"
            );
        }
        for absent in [0, 7, 15, 21, 35, 41, 47, 99] {
            assert!(
                !tree.contains(&key_from_u64(absent)).expect("lookup"),
                "{absent} should be absent"
            );
        }
    }

    #[test]
    fn test_lookup_reads_one_record_per_level() {
        let keys: Vec<Key> = (0..200).map(key_from_u64).collect();
        let (storage, summary) = build_tree(4, &keys);
        let mut tree = Tree::open_for_lookup(storage).expect("open tree");

        // The deepest keys live in leaves, so the descent touches every level.
        tree.store_mut().storage_mut().reset_stats();
        assert!(tree.contains(&keys[0]).expect("lookup"));
        assert_eq!(tree.storage().stats().reads, summary.height as u64);

        tree.store_mut().storage_mut().reset_stats();
        assert!(!tree.contains(&key_from_u64(1_000)).expect("lookup"));
        assert_eq!(tree.storage().stats().reads, summary.height as u64);
    }

    #[test]
    fn test_contains_many() {
        let keys: Vec<Key> = (0..50).map(|i| key_from_u64(i * 2)).collect();
        let (storage, _) = build_tree(5, &keys);
        let mut tree = Tree::open_for_lookup(storage).expect("open tree");

        let queries = [key_from_u64(4), key_from_u64(5), key_from_u64(98)];
        let answers = tree.contains_many(&queries).expect("lookup batch");
        assert_eq!(answers, vec![true, false, true]);
    }

    #[test]
    fn test_empty_index_answers_false() {
        let (storage, _) = build_tree(8, &[]);
        let mut tree = Tree::open_for_lookup(storage).expect("open tree");
        assert!(!tree.contains(&key_from_u64(0)).expect("lookup"));
    }

    #[test]
    fn test_cycle_is_reported() {
        let order = 2;
        let mut store = TreeStore::create(MemoryStorage::new(), order).expect("create store");
        let mut node = Node::new(order, 0, NULL_POINTER, false);
        node.push_key(key_from_u64(10));
        node.children[0] = 0;
        node.children[1] = 0;
        store.write_node(&node).expect("write node");

        let mut tree = Tree::open_for_lookup(store.into_inner()).expect("open tree");
        assert!(matches!(
            tree.contains(&key_from_u64(1)),
            Err(TreeError::Corrupted(_))
        ));
    }

    #[test]
    fn test_file_backed_lookup_after_reopen() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("hashes.idx");
        let keys: Vec<Key> = (0..500).map(|i| key_from_u64(i * 3)).collect();

        {
            let storage = FileStorage::create(&path).expect("create file");
            let mut builder =
                crate::storage::btree::BulkBuilder::create_for_bulk_load(storage, 6)
                    .expect("create builder");
            for key in &keys {
                builder.insert_sorted(*key).expect("insert");
            }
            builder.finalize().expect("finalize");
        }

        let storage = FileStorage::open_read_only(&path).expect("open file");
        let mut tree = Tree::open_for_lookup(storage).expect("open tree");
        assert_eq!(tree.order(), 6);
        for key in &keys {
            assert!(tree.contains(key).expect("lookup"));
        }
        assert!(!tree.contains(&key_from_u64(1)).expect("lookup"));
    }

    #[test]
    fn test_tree_error_display() {
        let e = TreeError::InvalidOrder(0);
        assert_eq!(e.to_string(), "invalid tree order: 0");

        let e = TreeError::from(NodeError::RecordSize {
            expected: 61,
            actual: 3,
        });
        assert!(e.to_string().contains("expected 61"));
        assert!(std::error::Error::source(&e).is_some());
    }
}

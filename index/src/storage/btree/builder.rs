//! Sequential bulk loading.
//!
//! The builder appends strictly ascending keys to the rightmost edge of the
//! tree. Only the current root-to-leaf path is kept in memory; a node is
//! written out when the path moves past it, and every node that leaves the
//! path is full.
//!
//! When the open leaf is full, the incoming key is promoted instead of
//! stored: it becomes a separator in the nearest ancestor with room, and a
//! fresh empty chain of nodes is hung under that separator down to leaf
//! depth. If no ancestor has room, a new root is created above the old one
//! and the tree grows by one level.
//!
//! The resulting tree is right-skewed: nodes on the rightmost path may be
//! under-filled or empty. `finalize` hands the tree to the rebalancer, which
//! repairs that edge.
//!
//! Pointers are handed out in creation order starting at 0 for the initial
//! root leaf, so identical input always yields an identical file.

use crate::storage::btree::node::{Key, NULL_POINTER, Node, Pointer};
use crate::storage::btree::rebalance::{self, RebalanceSummary};
use crate::storage::btree::store::TreeStore;
use crate::storage::btree::tree::TreeError;
use crate::storage::io::Storage;

/// Result of a finished bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    /// Number of keys inserted.
    pub keys: u64,
    /// Number of levels, counting the leaf level.
    pub height: usize,
    /// Number of node records written.
    pub nodes: u64,
    /// Pointer of the root node.
    pub root: Pointer,
}

/// Builds a tree from a stream of strictly ascending keys.
///
/// Call `insert_sorted` for every key, then `finalize` exactly once.
#[derive(Debug)]
pub struct BulkBuilder<S: Storage> {
    store: TreeStore<S>,
    /// Root first, open leaf last. Never empty before `finalize`.
    path: Vec<Node>,
    next_pointer: Pointer,
    height: usize,
    keys: u64,
    last_key: Option<Key>,
    finalized: bool,
}

impl<S: Storage> BulkBuilder<S> {
    /// Start a new tree of the given order on `storage`.
    ///
    /// The header is written immediately; the root is an empty leaf at
    /// pointer 0.
    pub fn create_for_bulk_load(storage: S, order: u32) -> Result<Self, BuildError> {
        let store = TreeStore::create(storage, order)?;
        let root = Node::new(order, 0, NULL_POINTER, true);

        tracing::debug!(order, "starting bulk load");
        Ok(Self {
            store,
            path: vec![root],
            next_pointer: 1,
            height: 1,
            keys: 0,
            last_key: None,
            finalized: false,
        })
    }

    /// Append `key`, which must be greater than every key inserted so far.
    ///
    /// A rejected key leaves the tree unchanged.
    pub fn insert_sorted(&mut self, key: Key) -> Result<(), BuildError> {
        if self.finalized {
            return Err(BuildError::Finalized);
        }
        if let Some(previous) = self.last_key
            && key <= previous
        {
            return Err(BuildError::OutOfOrder { previous, key });
        }

        let leaf = self.deepest()?;
        if leaf.is_full() {
            self.split(key)?;
        } else {
            leaf.push_key(key);
        }

        self.last_key = Some(key);
        self.keys += 1;
        Ok(())
    }

    /// Write out the open path, rebalance the right edge and sync storage.
    pub fn finalize(&mut self) -> Result<BuildSummary, BuildError> {
        if self.finalized {
            return Err(BuildError::Finalized);
        }

        self.flush_path()?;
        // A lone root leaf has no minimum fill to restore.
        if self.keys > 0 && self.height > 1 {
            let RebalanceSummary { nodes_created, .. } =
                rebalance::rebalance(&mut self.store, self.height, self.next_pointer)?;
            self.next_pointer += nodes_created;
        }
        self.store.sync()?;
        self.finalized = true;

        let summary = BuildSummary {
            keys: self.keys,
            height: self.height,
            nodes: u64::from(self.next_pointer),
            root: self.store.root(),
        };
        tracing::info!(
            keys = summary.keys,
            height = summary.height,
            nodes = summary.nodes,
            "bulk load finalized"
        );
        Ok(summary)
    }

    /// Number of levels, counting the leaf level.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Number of keys inserted so far.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.keys
    }

    /// Check if no key has been inserted yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.keys == 0
    }

    /// Maximum keys per node.
    #[must_use]
    pub const fn order(&self) -> u32 {
        self.store.order()
    }

    /// Give back the record store, e.g. to reopen it for lookups.
    pub fn into_store(self) -> TreeStore<S> {
        self.store
    }

    /// Write every path node without rebalancing. Leaves the path empty.
    pub(crate) fn flush_path(&mut self) -> Result<(), BuildError> {
        for node in self.path.drain(..) {
            self.store.write_node(&node)?;
        }
        Ok(())
    }

    fn deepest(&mut self) -> Result<&mut Node, BuildError> {
        self.path.last_mut().ok_or(BuildError::Finalized)
    }

    /// Promote `key` into the nearest ancestor of the open leaf with room.
    fn split(&mut self, key: Key) -> Result<(), BuildError> {
        // Level of the path's deepest node, counted from the leaves.
        let mut level = 0;
        loop {
            if self.path.len() == 1 {
                return self.grow_root(key, level);
            }

            let full = self.path.pop().ok_or(BuildError::Finalized)?;
            self.store.write_node(&full)?;

            let parent = self.deepest()?;
            if parent.is_full() {
                level += 1;
                continue;
            }

            parent.push_key(key);
            return self.create_children_till_leaf(level);
        }
    }

    /// Put a new root holding only `key` above the current (full) root.
    fn grow_root(&mut self, key: Key, level: usize) -> Result<(), BuildError> {
        let new_root = self.mint_pointer();

        let mut old_root = self.path.pop().ok_or(BuildError::Finalized)?;
        old_root.parent = new_root;
        self.store.write_node(&old_root)?;

        let mut root = Node::new(self.order(), new_root, NULL_POINTER, false);
        root.push_key(key);
        root.children[0] = old_root.pointer;
        self.path.push(root);

        self.create_children_till_leaf(level)?;
        self.store.set_root(new_root)?;
        self.height += 1;

        tracing::debug!(height = self.height, root = new_root, "tree grew a level");
        Ok(())
    }

    /// Hang a chain of empty nodes under the last separator of the deepest
    /// path node, from `level` down to the leaves.
    fn create_children_till_leaf(&mut self, level: usize) -> Result<(), BuildError> {
        for child_level in (0..=level).rev() {
            let pointer = self.mint_pointer();
            let order = self.order();

            let parent = self.deepest()?;
            let slot = parent.keys_count;
            parent.children[slot] = pointer;
            let parent_pointer = parent.pointer;

            self.path
                .push(Node::new(order, pointer, parent_pointer, child_level == 0));
        }
        Ok(())
    }

    const fn mint_pointer(&mut self) -> Pointer {
        let pointer = self.next_pointer;
        self.next_pointer += 1;
        pointer
    }
}

/// Error type for bulk loading.
#[derive(Debug)]
pub enum BuildError {
    /// Tree storage error.
    Tree(TreeError),
    /// Key is not greater than the previously inserted key.
    OutOfOrder { previous: Key, key: Key },
    /// The builder was already finalized.
    Finalized,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(e) => write!(f, "tree error: {e}"),
            Self::OutOfOrder { previous, key } => write!(
                f,
                "key {} is not greater than previous key {}",
                crate::key::to_hex(key),
                crate::key::to_hex(previous)
            ),
            Self::Finalized => write!(f, "builder already finalized"),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tree(e) => Some(e),
            Self::OutOfOrder { .. } | Self::Finalized => None,
        }
    }
}

impl From<TreeError> for BuildError {
    fn from(e: TreeError) -> Self {
        Self::Tree(e)
    }
}

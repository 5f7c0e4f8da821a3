//! Descending key cursor.
//!
//! `KeyProvider` walks a tree in reverse in-order, handing out the greatest
//! key not yet taken. It keeps an explicit stack with one frame per level on
//! the path to the node holding the next key. After every step the top frame
//! is normalized so it points at that key, which lets callers ask where the
//! next key lives before taking it.
//!
//! Frames hold their own copy of the node as read when the frame was pushed.
//! The provider never writes to the store.

use crate::storage::btree::node::{Key, NULL_POINTER, Node, Pointer};
use crate::storage::btree::store::TreeStore;
use crate::storage::btree::tree::{MAX_HEIGHT, TreeError};
use crate::storage::io::Storage;

#[derive(Debug)]
struct Frame {
    node: Node,
    /// Keys of this node not yet taken; the next one is `keys[keys_left - 1]`.
    keys_left: usize,
    /// The child at `children[keys_left]` still has to be walked.
    child_pending: bool,
}

impl Frame {
    fn new(node: Node) -> Self {
        let keys_left = node.keys_count;
        let child_pending = !node.is_leaf;
        Self {
            node,
            keys_left,
            child_pending,
        }
    }
}

/// Cursor yielding the keys of a tree in strictly descending order.
#[derive(Debug)]
pub struct KeyProvider {
    stack: Vec<Frame>,
}

impl KeyProvider {
    /// Position the cursor on the greatest key of the tree rooted at the
    /// store's root.
    pub fn new<S: Storage>(store: &mut TreeStore<S>) -> Result<Self, TreeError> {
        let root = store.read_node(store.root())?;
        let mut provider = Self {
            stack: vec![Frame::new(root)],
        };
        provider.settle(store)?;
        Ok(provider)
    }

    /// Where the next key lives, as `(node, slot)`. `None` once exhausted.
    #[must_use]
    pub fn position(&self) -> Option<(Pointer, usize)> {
        let frame = self.stack.last()?;
        let slot = frame.keys_left.checked_sub(1)?;
        Some((frame.node.pointer, slot))
    }

    /// Number of keys of leaf `pointer` not yet taken.
    ///
    /// Only the leaf currently being drained can have a partial count; any
    /// other leaf reports zero.
    #[must_use]
    pub fn unread_in(&self, pointer: Pointer) -> usize {
        match self.stack.last() {
            Some(frame) if frame.node.is_leaf && frame.node.pointer == pointer => frame.keys_left,
            _ => 0,
        }
    }

    /// Check whether every key has been taken.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::is_empty() is not const-stable
    pub fn is_exhausted(&self) -> bool {
        self.stack.is_empty()
    }

    /// Take the greatest remaining key.
    pub fn next_key<S: Storage>(
        &mut self,
        store: &mut TreeStore<S>,
    ) -> Result<Option<Key>, TreeError> {
        let Some(frame) = self.stack.last_mut() else {
            return Ok(None);
        };

        frame.keys_left -= 1;
        let key = frame.node.keys[frame.keys_left];
        // The subtree left of an internal key holds the next smaller keys.
        frame.child_pending = !frame.node.is_leaf;

        self.settle(store)?;
        Ok(Some(key))
    }

    /// Descend into pending children and drop exhausted frames until the top
    /// frame holds the next key or the stack is empty.
    fn settle<S: Storage>(&mut self, store: &mut TreeStore<S>) -> Result<(), TreeError> {
        while let Some(frame) = self.stack.last_mut() {
            if frame.child_pending {
                frame.child_pending = false;
                let child = frame.node.children[frame.keys_left];
                if child == NULL_POINTER {
                    return Err(TreeError::Corrupted(format!(
                        "node {} has no child at slot {}",
                        frame.node.pointer, frame.keys_left
                    )));
                }
                if self.stack.len() >= MAX_HEIGHT {
                    return Err(TreeError::Corrupted(format!(
                        "descended more than {MAX_HEIGHT} levels"
                    )));
                }

                let node = store.read_node(child)?;
                self.stack.push(Frame::new(node));
            } else if frame.keys_left > 0 {
                return Ok(());
            } else {
                self.stack.pop();
            }
        }
        Ok(())
    }
}

/// Iterator adapter binding a `KeyProvider` to its store.
#[derive(Debug)]
pub struct DescendingKeys<'a, S: Storage> {
    provider: Option<KeyProvider>,
    store: &'a mut TreeStore<S>,
}

impl<'a, S: Storage> DescendingKeys<'a, S> {
    pub(crate) fn new(store: &'a mut TreeStore<S>) -> Result<Self, TreeError> {
        let provider = KeyProvider::new(store)?;
        Ok(Self {
            provider: Some(provider),
            store,
        })
    }
}

impl<S: Storage> Iterator for DescendingKeys<'_, S> {
    type Item = Result<Key, TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let provider = self.provider.as_mut()?;
        match provider.next_key(self.store) {
            Ok(Some(key)) => Some(Ok(key)),
            Ok(None) => {
                self.provider = None;
                None
            }
            Err(e) => {
                // Stop after the first error.
                self.provider = None;
                Some(Err(e))
            }
        }
    }
}

//! B-tree node types and serialization.
//!
//! Every node occupies a fixed-size record whose size depends only on the
//! tree order `M`:
//!
//! ```text
//! is_leaf     u8             nonzero = leaf
//! keys_count  u32
//! children    [u32; M + 1]   NULL_POINTER for unused slots
//! keys        [[u8; 20]; M]  zero for unused slots
//! parent      u32            NULL_POINTER for the root
//! ```
//!
//! Integers use the native byte order of the writing host, so index files are
//! not portable between hosts of different endianness.

#![allow(clippy::cast_possible_truncation)]

/// Size of a key in bytes.
pub const KEY_SIZE: usize = 20;

/// A 20-byte hash key, ordered byte-wise.
pub type Key = [u8; KEY_SIZE];

/// Index of a node record in the tree file.
pub type Pointer = u32;

/// Reserved pointer value meaning "no node".
pub const NULL_POINTER: Pointer = u32::MAX;

/// Size of the file header: `order: u32` followed by `root: u32`.
pub const HEADER_SIZE: u64 = 8;

/// Byte offset of the root pointer inside the header.
pub const ROOT_OFFSET: u64 = 4;

/// Largest order accepted when creating or opening a tree.
pub const MAX_ORDER: u32 = 65_535;

const IS_LEAF_OFFSET: usize = 0;
const KEYS_COUNT_OFFSET: usize = 1;
const CHILDREN_OFFSET: usize = 5;

/// Size in bytes of one node record for the given order.
#[must_use]
pub const fn record_size(order: u32) -> usize {
    let order = order as usize;
    1 + 4 + 4 * (order + 1) + KEY_SIZE * order + 4
}

/// Byte offset of the record for `pointer`.
#[must_use]
pub const fn node_offset(order: u32, pointer: Pointer) -> u64 {
    HEADER_SIZE + pointer as u64 * record_size(order) as u64
}

/// Minimum number of keys in a non-root node of a finalized tree.
///
/// The minimum degree is `ceil(M / 2)`; a node holds at least one key fewer
/// than that.
#[must_use]
pub const fn min_keys(order: u32) -> usize {
    (order as usize).div_ceil(2).saturating_sub(1)
}

/// Errors decoding a node record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Buffer length does not match the record size for the order.
    RecordSize { expected: usize, actual: usize },
    /// Stored key count exceeds the order.
    KeyCountOutOfRange {
        pointer: Pointer,
        keys_count: u32,
        order: u32,
    },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecordSize { expected, actual } => {
                write!(f, "node record is {actual} bytes, expected {expected}")
            }
            Self::KeyCountOutOfRange {
                pointer,
                keys_count,
                order,
            } => write!(
                f,
                "node {pointer} claims {keys_count} keys but order is {order}"
            ),
        }
    }
}

impl std::error::Error for NodeError {}

/// One B-tree node, decoded.
///
/// `keys` always has `order` entries and `children` always has `order + 1`;
/// only the first `keys_count` keys are meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Record index of this node. Not persisted; implied by the record offset.
    pub pointer: Pointer,
    pub is_leaf: bool,
    pub keys_count: usize,
    pub keys: Vec<Key>,
    pub children: Vec<Pointer>,
    pub parent: Pointer,
}

impl Node {
    /// Create an empty node with every child slot unset.
    #[must_use]
    pub fn new(order: u32, pointer: Pointer, parent: Pointer, is_leaf: bool) -> Self {
        let order = order as usize;
        Self {
            pointer,
            is_leaf,
            keys_count: 0,
            keys: vec![[0u8; KEY_SIZE]; order],
            children: vec![NULL_POINTER; order + 1],
            parent,
        }
    }

    /// Maximum number of keys this node can hold.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn order(&self) -> usize {
        self.keys.len()
    }

    /// Check if the node is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.keys_count >= self.order()
    }

    /// The populated keys, ascending.
    #[must_use]
    pub fn valid_keys(&self) -> &[Key] {
        &self.keys[..self.keys_count]
    }

    /// Append a key after the current last key.
    ///
    /// The caller guarantees the node is not full and `key` is greater than
    /// every key already present.
    pub fn push_key(&mut self, key: Key) {
        debug_assert!(!self.is_full(), "push_key on a full node");
        self.keys[self.keys_count] = key;
        self.keys_count += 1;
    }

    /// Binary search the populated keys.
    ///
    /// `Ok(i)` if `keys[i] == key`, otherwise `Err(i)` where `i` is the index
    /// of the child subtree that would contain `key`.
    pub fn search(&self, key: &Key) -> Result<usize, usize> {
        self.valid_keys().binary_search(key)
    }

    /// Number of leading child slots that are set.
    #[must_use]
    pub fn children_count(&self) -> usize {
        self.children
            .iter()
            .take_while(|&&child| child != NULL_POINTER)
            .count()
    }

    /// Serialize into `buf`, which must be exactly one record long.
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), NodeError> {
        let order = self.order();
        let expected = record_size(order as u32);
        if buf.len() != expected {
            return Err(NodeError::RecordSize {
                expected,
                actual: buf.len(),
            });
        }

        buf[IS_LEAF_OFFSET] = u8::from(self.is_leaf);
        write_u32(buf, KEYS_COUNT_OFFSET, self.keys_count as u32);

        let mut offset = CHILDREN_OFFSET;
        for &child in &self.children {
            write_u32(buf, offset, child);
            offset += 4;
        }

        for (slot, key) in self.keys.iter().enumerate() {
            let target = &mut buf[offset..offset + KEY_SIZE];
            if slot < self.keys_count {
                target.copy_from_slice(key);
            } else {
                target.fill(0);
            }
            offset += KEY_SIZE;
        }

        write_u32(buf, offset, self.parent);
        Ok(())
    }

    /// Deserialize the record stored for `pointer`.
    pub fn decode(pointer: Pointer, order: u32, buf: &[u8]) -> Result<Self, NodeError> {
        let expected = record_size(order);
        if buf.len() != expected {
            return Err(NodeError::RecordSize {
                expected,
                actual: buf.len(),
            });
        }

        let keys_count = read_u32(buf, KEYS_COUNT_OFFSET);
        if keys_count > order {
            return Err(NodeError::KeyCountOutOfRange {
                pointer,
                keys_count,
                order,
            });
        }

        let mut node = Self::new(order, pointer, NULL_POINTER, buf[IS_LEAF_OFFSET] != 0);
        node.keys_count = keys_count as usize;

        let mut offset = CHILDREN_OFFSET;
        for child in &mut node.children {
            *child = read_u32(buf, offset);
            offset += 4;
        }

        for key in &mut node.keys {
            key.copy_from_slice(&buf[offset..offset + KEY_SIZE]);
            offset += KEY_SIZE;
        }

        node.parent = read_u32(buf, offset);
        Ok(node)
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_ne_bytes(bytes)
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

//! Record-level access to a tree file.
//!
//! `TreeStore` owns the backing `Storage` and knows the tree order, so it can
//! translate node pointers into record offsets. Both the lookup path and the
//! builder go through it.

use crate::storage::btree::node::{
    HEADER_SIZE, MAX_ORDER, NULL_POINTER, Node, Pointer, ROOT_OFFSET, min_keys, node_offset,
    record_size,
};
use crate::storage::btree::tree::TreeError;
use crate::storage::io::Storage;

/// Typed access to the header and node records of a tree file.
#[derive(Debug)]
pub struct TreeStore<S: Storage> {
    storage: S,
    order: u32,
    root: Pointer,
    /// Scratch buffer, one record long.
    buffer: Vec<u8>,
}

impl<S: Storage> TreeStore<S> {
    /// Initialize a fresh tree file: writes the header with root pointer 0.
    pub fn create(mut storage: S, order: u32) -> Result<Self, TreeError> {
        validate_order(order)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[..4].copy_from_slice(&order.to_ne_bytes());
        header[4..].copy_from_slice(&0u32.to_ne_bytes());
        storage.write_all_at(0, &header)?;

        Ok(Self {
            storage,
            order,
            root: 0,
            buffer: vec![0u8; record_size(order)],
        })
    }

    /// Open an existing tree file and validate its header.
    pub fn open(mut storage: S) -> Result<Self, TreeError> {
        let (order, root) = read_header(&mut storage)?;
        validate_order(order)?;
        if root == NULL_POINTER {
            return Err(TreeError::NullPointer);
        }

        Ok(Self {
            storage,
            order,
            root,
            buffer: vec![0u8; record_size(order)],
        })
    }

    /// Maximum number of keys per node.
    #[must_use]
    pub const fn order(&self) -> u32 {
        self.order
    }

    /// Pointer of the current root node.
    #[must_use]
    pub const fn root(&self) -> Pointer {
        self.root
    }

    /// Minimum key count of a non-root node.
    #[must_use]
    pub const fn min_keys(&self) -> usize {
        min_keys(self.order)
    }

    /// Read the `(order, root)` header straight from storage.
    pub fn read_header(&mut self) -> Result<(u32, Pointer), TreeError> {
        read_header(&mut self.storage)
    }

    /// Read and decode the node stored at `pointer`.
    pub fn read_node(&mut self, pointer: Pointer) -> Result<Node, TreeError> {
        if pointer == NULL_POINTER {
            return Err(TreeError::NullPointer);
        }

        let offset = node_offset(self.order, pointer);
        self.storage.read_exact_at(offset, &mut self.buffer)?;
        Ok(Node::decode(pointer, self.order, &self.buffer)?)
    }

    /// Encode `node` and write it at the record for `node.pointer`.
    pub fn write_node(&mut self, node: &Node) -> Result<(), TreeError> {
        if node.pointer == NULL_POINTER {
            return Err(TreeError::NullPointer);
        }
        if node.order() != self.order as usize {
            return Err(TreeError::Corrupted(format!(
                "node {} has order {}, tree order is {}",
                node.pointer,
                node.order(),
                self.order
            )));
        }

        node.encode(&mut self.buffer)?;
        let offset = node_offset(self.order, node.pointer);
        self.storage.write_all_at(offset, &self.buffer)?;
        Ok(())
    }

    /// Persist a new root pointer in the header.
    pub fn set_root(&mut self, pointer: Pointer) -> Result<(), TreeError> {
        self.storage
            .write_all_at(ROOT_OFFSET, &pointer.to_ne_bytes())?;
        self.root = pointer;
        Ok(())
    }

    /// Number of node records the file has room for.
    pub fn record_count(&self) -> Result<u64, TreeError> {
        let size = self.storage.size()?;
        Ok(size.saturating_sub(HEADER_SIZE) / record_size(self.order) as u64)
    }

    /// Flush pending writes.
    pub fn sync(&mut self) -> Result<(), TreeError> {
        self.storage.sync()?;
        Ok(())
    }

    /// Borrow the backing storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutably borrow the backing storage.
    pub const fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Give back the backing storage.
    pub fn into_inner(self) -> S {
        self.storage
    }
}

fn validate_order(order: u32) -> Result<(), TreeError> {
    if order == 0 || order > MAX_ORDER {
        return Err(TreeError::InvalidOrder(order));
    }
    Ok(())
}

fn read_header<S: Storage>(storage: &mut S) -> Result<(u32, Pointer), TreeError> {
    let mut header = [0u8; HEADER_SIZE as usize];
    storage.read_exact_at(0, &mut header)?;

    let mut order = [0u8; 4];
    order.copy_from_slice(&header[..4]);
    let mut root = [0u8; 4];
    root.copy_from_slice(&header[4..]);
    Ok((u32::from_ne_bytes(order), u32::from_ne_bytes(root)))
}

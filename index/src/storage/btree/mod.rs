//! Disk-resident B-tree for 20-byte keys.
//!
//! The tree is built once from ascending keys and then only read.
//!
//! # Structure
//!
//! - `node`: fixed-size node records and the record offset arithmetic
//! - `store`: header and record I/O on top of a `Storage`
//! - `tree`: point lookups on a finalized tree
//! - `builder`: sequential bulk loading
//! - `rebalance`: post-load repair of the right edge
//! - `provider`: descending key cursor used by the rebalancer
//! - `verify`: invariant checks and statistics
//!
//! # Usage
//!
//! ```
//! use hashindex::storage::MemoryStorage;
//! use hashindex::storage::btree::{BulkBuilder, Tree};
//!
//! let mut builder = BulkBuilder::create_for_bulk_load(MemoryStorage::new(), 4).unwrap();
//! for i in 0u8..10 {
//!     builder.insert_sorted([i; 20]).unwrap();
//! }
//! builder.finalize().unwrap();
//!
//! let storage = builder.into_store().into_inner();
//! let mut tree = Tree::open_for_lookup(storage).unwrap();
//! assert!(tree.contains(&[3; 20]).unwrap());
//! assert!(!tree.contains(&[42; 20]).unwrap());
//! ```

mod builder;
mod node;
mod provider;
mod rebalance;
mod store;
mod tree;
mod verify;

pub use builder::{BuildError, BuildSummary, BulkBuilder};
pub use node::{
    HEADER_SIZE, KEY_SIZE, Key, MAX_ORDER, NULL_POINTER, Node, NodeError, Pointer, min_keys,
    node_offset, record_size,
};
pub use provider::{DescendingKeys, KeyProvider};
pub use rebalance::{RebalanceSummary, rebalance};
pub use store::TreeStore;
pub use tree::{MAX_HEIGHT, Tree, TreeError};
pub use verify::{InvariantViolation, TreeStats, VerifyError};

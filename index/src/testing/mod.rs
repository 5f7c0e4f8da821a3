use std::collections::BTreeSet;

use rand::Rng;

use crate::storage::MemoryStorage;
use crate::storage::btree::{BuildSummary, BulkBuilder, KEY_SIZE, Key, Tree};

/// A key whose first eight bytes are `n` big-endian, so keys sort like `n`.
pub fn key_from_u64(n: u64) -> Key {
    let mut key = [0u8; KEY_SIZE];
    key[..8].copy_from_slice(&n.to_be_bytes());
    key
}

/// A key that is all zeros except for its first byte.
pub fn key_with_first_byte(first: u8) -> Key {
    let mut key = [0u8; KEY_SIZE];
    key[0] = first;
    key
}

/// `count` distinct random keys in ascending order.
pub fn random_ascending_keys<R: Rng>(rng: &mut R, count: usize) -> Vec<Key> {
    let mut keys = BTreeSet::new();
    while keys.len() < count {
        keys.insert(rng.random::<Key>());
    }
    keys.into_iter().collect()
}

/// Bulk load `keys` into memory and finalize.
pub fn build_tree(order: u32, keys: &[Key]) -> (MemoryStorage, BuildSummary) {
    let mut builder =
        BulkBuilder::create_for_bulk_load(MemoryStorage::new(), order).expect("create builder");
    for key in keys {
        builder.insert_sorted(*key).expect("insert key");
    }
    let summary = builder.finalize().expect("finalize");
    (builder.into_store().into_inner(), summary)
}

/// Bulk load `keys` into memory and open the result for lookups.
pub fn open_tree(order: u32, keys: &[Key]) -> Tree<MemoryStorage> {
    let (storage, _) = build_tree(order, keys);
    Tree::open_for_lookup(storage).expect("open tree")
}

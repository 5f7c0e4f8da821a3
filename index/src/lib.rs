#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]
// Building:
//  1. Hash list comes in (unsorted, possibly with duplicates)
//  2. Scatter into 256 buckets by first byte, sort + dedup each bucket
//  3. Append sorted keys to the rightmost edge of the tree
//  4. Repair the right edge so every node meets its minimum fill
//
// Querying:
//  - Descend from the root, one record read per level

pub mod config;
pub mod key;
pub mod prepare;
pub mod storage;
#[cfg(test)]
mod testing;

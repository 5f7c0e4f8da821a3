//! Storage layer for the hash index.
//!
//! - `io`: the `Storage` trait and its error type
//! - `file`: file-backed storage
//! - `memory`: in-memory storage with operation counters
//! - `btree`: the on-disk B-tree built on top of a `Storage`

pub mod btree;
mod file;
mod io;
mod memory;

pub use file::FileStorage;
pub use io::{Storage, StorageError};
pub use memory::{MemoryStorage, StorageStats};

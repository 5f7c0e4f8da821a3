//! Storage abstraction for the index file.
//!
//! This module provides a `Storage` trait that abstracts over positional byte
//! I/O, allowing the tree to use real file I/O in production and in-memory
//! storage in tests.
//!
//! # Design
//!
//! The trait is a minimal abstraction over what the tree needs:
//! - Positional reads of an exact length
//! - Positional writes, extending the backing store when needed
//! - Synchronization
//! - Current size
//!
//! Node records have a fixed size, so every tree operation maps onto exactly
//! one `read_exact_at` or `write_all_at` call.

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// A read reached past the end of the backing store.
    OutOfBounds { offset: u64, length: usize, size: u64 },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OutOfBounds {
                offset,
                length,
                size,
            } => write!(
                f,
                "read of {length} bytes at offset {offset} out of bounds (size: {size})"
            ),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::OutOfBounds { .. } => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Abstraction over positional byte storage.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read_exact_at` returns the last written content for a range
/// - `write_all_at` past the end grows the store, zero-filling any gap
/// - `sync` makes all previous writes durable
pub trait Storage {
    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// Fails if the range is not fully inside the store.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write all of `buf` starting at `offset`.
    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError>;

    /// Sync all pending writes to durable storage.
    fn sync(&mut self) -> Result<(), StorageError>;

    /// Current size of the store in bytes.
    fn size(&self) -> Result<u64, StorageError>;
}

//! In-memory storage for tests and small indexes.
//!
//! `MemoryStorage` keeps the whole index in a growable buffer and counts every
//! operation, which lets tests assert on the I/O cost of lookups and builds.

use crate::storage::io::{Storage, StorageError};

/// Statistics about storage operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of read operations.
    pub reads: u64,
    /// Number of write operations.
    pub writes: u64,
    /// Number of sync operations.
    pub syncs: u64,
    /// Total bytes read.
    pub bytes_read: u64,
    /// Total bytes written.
    pub bytes_written: u64,
}

/// In-memory storage implementation.
///
/// Not thread-safe; each reader owns its own instance (or a clone of one).
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    data: Vec<u8>,
    stats: StorageStats,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            stats: StorageStats {
                reads: 0,
                writes: 0,
                syncs: 0,
                bytes_read: 0,
                bytes_written: 0,
            },
        }
    }

    /// Wrap existing bytes, e.g. an index file loaded into memory.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            stats: StorageStats::default(),
        }
    }

    /// Get the operation counters.
    #[must_use]
    pub const fn stats(&self) -> StorageStats {
        self.stats
    }

    /// Reset the operation counters.
    pub const fn reset_stats(&mut self) {
        self.stats = StorageStats {
            reads: 0,
            writes: 0,
            syncs: 0,
            bytes_read: 0,
            bytes_written: 0,
        };
    }

    /// Raw contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Storage for MemoryStorage {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        let size = self.data.len() as u64;
        let end = offset.saturating_add(buf.len() as u64);
        if end > size {
            return Err(StorageError::OutOfBounds {
                offset,
                length: buf.len(),
                size,
            });
        }

        // Both bounds are <= data.len(), so they fit in usize.
        let start = usize::try_from(offset).map_err(|_| StorageError::OutOfBounds {
            offset,
            length: buf.len(),
            size,
        })?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);

        self.stats.reads += 1;
        self.stats.bytes_read += buf.len() as u64;
        Ok(())
    }

    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        let start = usize::try_from(offset)
            .map_err(|_| StorageError::Io(std::io::Error::other("offset exceeds address space")))?;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);

        self.stats.writes += 1;
        self.stats.bytes_written += buf.len() as u64;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.stats.syncs += 1;
        Ok(())
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.data.len() as u64)
    }
}

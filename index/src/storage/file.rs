//! Index file I/O operations.
//!
//! This module handles reading and writing byte ranges of the index file.
//! Each handle owns its own seek cursor, so concurrent readers open their
//! own `FileStorage`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::io::{Storage, StorageError};

/// An index file handle with low-level positional I/O.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
    path: PathBuf,
}

impl FileStorage {
    /// Create a new index file at the given path.
    ///
    /// An existing file at the same path is truncated.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing index file for lookups only.
    ///
    /// Writes through this handle fail with an I/O error.
    pub fn open_read_only(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new().read(true).open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path this handle was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(offset))?;
        match self.file.read_exact(buf) {
            Ok(()) => Ok(()),
            // The file size is only looked up for short reads.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(StorageError::OutOfBounds {
                    offset,
                    length: buf.len(),
                    size: self.size()?,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.file.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");
        (dir, path)
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, path) = create_test_file();
        let mut storage = FileStorage::create(&path).expect("create file");

        storage.write_all_at(0, b"hello").expect("write");
        storage.write_all_at(10, b"world").expect("write past end");
        assert_eq!(storage.size().expect("size"), 15);

        let mut buf = [0u8; 5];
        storage.read_exact_at(10, &mut buf).expect("read");
        assert_eq!(&buf, b"world");

        // The gap reads back as zeros.
        storage.read_exact_at(5, &mut buf).expect("read gap");
        assert_eq!(buf, [0u8; 5]);
    }

    #[test]
    fn test_read_past_end() {
        let (_dir, path) = create_test_file();
        let mut storage = FileStorage::create(&path).expect("create file");
        storage.write_all_at(0, &[1, 2, 3]).expect("write");

        let mut buf = [0u8; 4];
        let result = storage.read_exact_at(0, &mut buf);
        assert!(matches!(
            result,
            Err(StorageError::OutOfBounds { size: 3, .. })
        ));

        // Starting beyond the end is out of bounds too, not a seek error.
        let result = storage.read_exact_at(100, &mut buf);
        assert!(matches!(
            result,
            Err(StorageError::OutOfBounds {
                offset: 100,
                length: 4,
                size: 3
            })
        ));
    }

    #[test]
    fn test_reopen_persists() {
        let (_dir, path) = create_test_file();
        {
            let mut storage = FileStorage::create(&path).expect("create file");
            storage.write_all_at(4, &[9, 9]).expect("write");
            storage.sync().expect("sync");
        }

        let mut storage = FileStorage::open_read_only(&path).expect("reopen");
        let mut buf = [0u8; 2];
        storage.read_exact_at(4, &mut buf).expect("read");
        assert_eq!(buf, [9, 9]);
        assert_eq!(storage.path(), path.as_path());
        assert!(storage.write_all_at(0, &[1]).is_err());
    }
}

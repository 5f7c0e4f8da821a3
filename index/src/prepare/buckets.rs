//! Bucketed external sort.
//!
//! Keys are scattered into 256 bucket files by their first byte. Every key
//! in bucket `b` sorts before every key in bucket `b + 1`, so sorting the
//! buckets one at a time and concatenating them yields the globally sorted
//! sequence while only one bucket is ever held in memory.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::prepare::PrepareError;
use crate::prepare::reader::parse_line;
use crate::storage::btree::{KEY_SIZE, Key};

/// Number of buckets, one per possible first key byte.
pub const BUCKET_COUNT: usize = 256;

/// Bucket files produced by `split_input`.
///
/// The files live in a directory owned by the caller, which removes them.
#[derive(Debug)]
pub struct BucketSet {
    paths: Vec<PathBuf>,
    keys: u64,
}

impl BucketSet {
    /// Path of bucket `index`. The file may not exist if the bucket is empty.
    #[must_use]
    pub fn path(&self, index: usize) -> &Path {
        &self.paths[index]
    }

    /// Number of keys read from the input, duplicates included.
    #[must_use]
    pub const fn keys(&self) -> u64 {
        self.keys
    }
}

/// One bucket after sorting and deduplication.
#[derive(Debug)]
pub struct SortedBucket {
    pub index: usize,
    pub keys: Vec<Key>,
    pub duplicates: u64,
}

/// Read a hash list and scatter its keys into bucket files under
/// `directory`, which is created if needed.
pub fn split_input(
    input: &Path,
    directory: &Path,
    flush_threshold: usize,
) -> Result<BucketSet, PrepareError> {
    std::fs::create_dir_all(directory)?;
    let reader = BufReader::new(File::open(input)?);
    let mut writer = BucketWriter::create(directory, flush_threshold)?;

    // Split on raw bytes so a line that is not UTF-8 is reported as a bad
    // hash on that line rather than as a read failure.
    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        match parse_line(&String::from_utf8_lossy(&line)) {
            Ok(Some(key)) => writer.push(key)?,
            Ok(None) => {}
            Err(source) => {
                return Err(PrepareError::Parse {
                    line: index as u64 + 1,
                    source,
                });
            }
        }
    }

    writer.finish()
}

/// Load bucket `index` from `path`, sort it and drop duplicates.
pub fn load_sorted(index: usize, path: &Path) -> std::io::Result<SortedBucket> {
    let mut bytes = Vec::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_end(&mut bytes)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    if bytes.len() % KEY_SIZE != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "bucket file {} is {} bytes, not a multiple of {KEY_SIZE}",
                path.display(),
                bytes.len()
            ),
        ));
    }

    let mut keys: Vec<Key> = bytes
        .chunks_exact(KEY_SIZE)
        .map(|chunk| {
            let mut key = [0u8; KEY_SIZE];
            key.copy_from_slice(chunk);
            key
        })
        .collect();
    keys.sort_unstable();
    let before = keys.len();
    keys.dedup();

    Ok(SortedBucket {
        index,
        duplicates: (before - keys.len()) as u64,
        keys,
    })
}

/// Per-bucket in-memory buffers appended to their files when full.
struct BucketWriter {
    paths: Vec<PathBuf>,
    buffers: Vec<Vec<Key>>,
    flush_threshold: usize,
    keys: u64,
}

impl BucketWriter {
    fn create(directory: &Path, flush_threshold: usize) -> std::io::Result<Self> {
        let paths: Vec<PathBuf> = (0..BUCKET_COUNT)
            .map(|index| directory.join(format!("bucket_{index:02x}.bin")))
            .collect();

        // Leftovers from an interrupted run would be appended to.
        for path in &paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(Self {
            paths,
            buffers: vec![Vec::new(); BUCKET_COUNT],
            flush_threshold: flush_threshold.max(1),
            keys: 0,
        })
    }

    fn push(&mut self, key: Key) -> std::io::Result<()> {
        let index = usize::from(key[0]);
        self.buffers[index].push(key);
        self.keys += 1;
        if self.buffers[index].len() >= self.flush_threshold {
            self.flush(index)?;
        }
        Ok(())
    }

    fn flush(&mut self, index: usize) -> std::io::Result<()> {
        if self.buffers[index].is_empty() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths[index])?;
        let mut writer = BufWriter::new(file);
        for key in &self.buffers[index] {
            writer.write_all(key)?;
        }
        writer.flush()?;

        self.buffers[index].clear();
        Ok(())
    }

    fn finish(mut self) -> Result<BucketSet, PrepareError> {
        for index in 0..BUCKET_COUNT {
            self.flush(index)?;
        }
        Ok(BucketSet {
            paths: self.paths,
            keys: self.keys,
        })
    }
}

//! Building an index from an unsorted hash list.
//!
//! 1. The input is streamed once and scattered into 256 bucket files by the
//!    first key byte.
//! 2. Buckets are loaded, sorted and deduplicated one at a time, in order.
//! 3. Sorted buckets go through a bounded queue to a blocking task that owns
//!    the `BulkBuilder`, so sorting the next bucket overlaps inserting the
//!    current one.
//! 4. The builder is finalized.
//!
//! Bucket files live in a temporary directory under the work directory,
//! which is removed whether or not preparation succeeds. If preparation
//! fails part way, the output file is incomplete and should be discarded.

pub mod buckets;
pub mod reader;

use std::path::Path;

use tokio::sync::mpsc;

use crate::config::PrepareConfig;
use crate::key::KeyParseError;
use crate::storage::btree::{BuildError, BuildSummary, BulkBuilder};
use crate::storage::{FileStorage, Storage, StorageError};
use buckets::{BUCKET_COUNT, SortedBucket};

/// Result of a successful preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareSummary {
    /// Keys read from the input, duplicates included.
    pub keys_read: u64,
    /// Distinct keys stored in the index.
    pub keys: u64,
    /// Keys dropped because they were already present.
    pub duplicates: u64,
    /// Height of the resulting tree.
    pub height: usize,
    /// Node records in the resulting tree.
    pub nodes: u64,
}

/// Build the index at `output` from the hash list at `input`.
pub async fn prepare(
    input: &Path,
    output: &Path,
    config: &PrepareConfig,
) -> Result<PrepareSummary, PrepareError> {
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        order = config.order,
        "preparing index"
    );

    std::fs::create_dir_all(&config.work_directory)?;
    let bucket_directory = tempfile::Builder::new()
        .prefix("buckets-")
        .tempdir_in(&config.work_directory)?;
    let bucket_path = bucket_directory.path().to_path_buf();
    let input_path = input.to_path_buf();
    let threshold = config.bucket_flush_threshold;
    let bucket_set = tokio::task::spawn_blocking(move || {
        buckets::split_input(&input_path, &bucket_path, threshold)
    })
    .await??;
    tracing::info!(keys = bucket_set.keys(), "split input into buckets");

    let storage = FileStorage::create(output)?;
    let builder = BulkBuilder::create_for_bulk_load(storage, config.order)?;
    let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));
    let consumer = tokio::task::spawn_blocking(move || insert_buckets(builder, receiver));

    let mut duplicates = 0;
    for index in 0..BUCKET_COUNT {
        let path = bucket_set.path(index).to_path_buf();
        let sorted = tokio::task::spawn_blocking(move || buckets::load_sorted(index, &path)).await??;
        duplicates += sorted.duplicates;

        if sender.send(sorted).await.is_err() {
            // The consumer stopped early; its own error is reported below.
            break;
        }
    }
    drop(sender);

    let build = consumer.await??;
    let keys_read = bucket_set.keys();
    bucket_directory.close()?;

    let summary = PrepareSummary {
        keys_read,
        keys: build.keys,
        duplicates,
        height: build.height,
        nodes: build.nodes,
    };
    tracing::info!(
        keys = summary.keys,
        duplicates = summary.duplicates,
        height = summary.height,
        nodes = summary.nodes,
        "index prepared"
    );
    Ok(summary)
}

/// Drain the queue into the builder, then finalize.
fn insert_buckets<S: Storage>(
    mut builder: BulkBuilder<S>,
    mut receiver: mpsc::Receiver<SortedBucket>,
) -> Result<BuildSummary, PrepareError> {
    while let Some(bucket) = receiver.blocking_recv() {
        for key in &bucket.keys {
            builder.insert_sorted(*key)?;
        }

        tracing::debug!(
            bucket = bucket.index,
            keys = bucket.keys.len(),
            "inserted bucket"
        );
        let done = bucket.index + 1;
        if done % 16 == 0 {
            tracing::info!(
                percent = done * 100 / BUCKET_COUNT,
                keys = builder.len(),
                "insertion progress"
            );
        }
    }

    Ok(builder.finalize()?)
}

/// Error type for index preparation.
#[derive(Debug)]
pub enum PrepareError {
    /// I/O error on the input or bucket files.
    Io(std::io::Error),
    /// A line of the input is not a valid hash. Lines are 1-based.
    Parse { line: u64, source: KeyParseError },
    /// Output storage error.
    Storage(StorageError),
    /// Tree construction error.
    Build(BuildError),
    /// A background task panicked or was cancelled.
    Join(tokio::task::JoinError),
}

impl std::fmt::Display for PrepareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Parse { line, source } => write!(f, "line {line}: {source}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Build(e) => write!(f, "build error: {e}"),
            Self::Join(e) => write!(f, "background task failed: {e}"),
        }
    }
}

impl std::error::Error for PrepareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse { source, .. } => Some(source),
            Self::Storage(e) => Some(e),
            Self::Build(e) => Some(e),
            Self::Join(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PrepareError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StorageError> for PrepareError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<BuildError> for PrepareError {
    fn from(e: BuildError) -> Self {
        Self::Build(e)
    }
}

impl From<tokio::task::JoinError> for PrepareError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e)
    }
}

//! Preparer configuration module.
//!
//! This module provides configuration loading for index preparation from
//! environment variables. Command-line flags override these values.
//!
//! # Environment Variables
//!
//! - `HASHINDEX_ORDER`: Maximum keys per tree node (default: `2048`)
//! - `HASHINDEX_WORK_DIRECTORY`: Directory for temporary bucket files
//!   (default: `<system temp dir>/hashindex`)
//! - `HASHINDEX_QUEUE_DEPTH`: Sorted buckets buffered ahead of insertion
//!   (default: `4`)
//! - `HASHINDEX_BUCKET_FLUSH_THRESHOLD`: Keys buffered per bucket before
//!   appending to its file (default: `100000`)
//!
//! # Invariants
//!
//! - `order` is in `1..=MAX_ORDER`
//! - `queue_depth` and `bucket_flush_threshold` are at least 1

use std::path::PathBuf;

use crate::storage::btree::MAX_ORDER;

/// Configuration for building an index from a hash list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareConfig {
    /// Tree order of the produced index.
    pub order: u32,
    /// Directory where bucket files are written during preparation.
    pub work_directory: PathBuf,
    /// Number of sorted buckets that may wait for the builder.
    pub queue_depth: usize,
    /// Keys held in memory per bucket before they are appended to disk.
    pub bucket_flush_threshold: usize,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            order: Self::DEFAULT_ORDER,
            work_directory: Self::default_work_directory(),
            queue_depth: Self::DEFAULT_QUEUE_DEPTH,
            bucket_flush_threshold: Self::DEFAULT_BUCKET_FLUSH_THRESHOLD,
        }
    }
}

impl PrepareConfig {
    /// Default tree order.
    pub const DEFAULT_ORDER: u32 = 2048;
    /// Default number of buffered sorted buckets.
    pub const DEFAULT_QUEUE_DEPTH: usize = 4;
    /// Default per-bucket key buffer.
    pub const DEFAULT_BUCKET_FLUSH_THRESHOLD: usize = 100_000;

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse or is out of
    /// range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let order = match lookup("HASHINDEX_ORDER") {
            Some(value) => parse_order("HASHINDEX_ORDER", &value)?,
            None => Self::DEFAULT_ORDER,
        };
        let work_directory = lookup("HASHINDEX_WORK_DIRECTORY")
            .map_or_else(Self::default_work_directory, PathBuf::from);
        let queue_depth = match lookup("HASHINDEX_QUEUE_DEPTH") {
            Some(value) => parse_positive("HASHINDEX_QUEUE_DEPTH", &value)?,
            None => Self::DEFAULT_QUEUE_DEPTH,
        };
        let bucket_flush_threshold = match lookup("HASHINDEX_BUCKET_FLUSH_THRESHOLD") {
            Some(value) => parse_positive("HASHINDEX_BUCKET_FLUSH_THRESHOLD", &value)?,
            None => Self::DEFAULT_BUCKET_FLUSH_THRESHOLD,
        };

        Ok(Self {
            order,
            work_directory,
            queue_depth,
            bucket_flush_threshold,
        })
    }

    fn default_work_directory() -> PathBuf {
        std::env::temp_dir().join("hashindex")
    }
}

fn parse_order(name: &str, value: &str) -> Result<u32, ConfigError> {
    let order = value
        .parse::<u32>()
        .map_err(|_| invalid_order(name, value))?;
    check_order(name, order)
}

/// Range-check a tree order taken from `name`, an environment variable or a
/// command-line flag.
pub fn check_order(name: &str, order: u32) -> Result<u32, ConfigError> {
    if order == 0 || order > MAX_ORDER {
        return Err(invalid_order(name, &order.to_string()));
    }
    Ok(order)
}

fn invalid_order(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("'{value}' is not a valid order (must be 1-{MAX_ORDER})"),
    }
}

fn parse_positive(name: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a positive integer"),
        }),
    }
}

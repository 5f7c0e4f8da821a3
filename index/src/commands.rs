use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hashindex",
    about = "Build and query disk-resident indexes of 20-byte hashes",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build an index from a text file of hex hashes
    Prepare {
        /// Hash list, one `HASH[:count]` per line
        #[arg(short, long)]
        input: PathBuf,
        /// Index file to create (overwritten if present)
        #[arg(short, long)]
        output: PathBuf,
        /// Directory for temporary bucket files
        #[arg(short, long)]
        work_dir: Option<PathBuf>,
        /// Maximum keys per tree node
        #[arg(long)]
        order: Option<u32>,
    },
    /// Check whether hashes are present; prints `<HASH> 1|0` per hash
    Exists {
        /// Index file
        #[arg(long)]
        index: PathBuf,
        /// Hashes to look up, 40 hex characters each
        #[arg(required = true)]
        hashes: Vec<String>,
    },
    /// Check every structural invariant of an index
    Verify {
        /// Index file
        #[arg(long)]
        index: PathBuf,
    },
    /// Show index statistics
    Stats {
        /// Index file
        #[arg(long)]
        index: PathBuf,
    },
}

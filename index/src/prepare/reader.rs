//! Hash list parsing.
//!
//! Each line holds one hash as 40 hex characters, optionally followed by
//! `:` and an occurrence count. The count is ignored. Blank lines are
//! skipped.

use crate::key::{KeyParseError, parse_hex};
use crate::storage::btree::Key;

/// Parse one line of a hash list. `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<Key>, KeyParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let hash = line.split_once(':').map_or(line, |(hash, _count)| hash);
    parse_hex(hash.trim_end()).map(Some)
}

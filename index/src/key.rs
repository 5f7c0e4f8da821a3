//! Hex text form of index keys.
//!
//! Keys travel as 40 hexadecimal characters. Parsing accepts either case;
//! formatting produces uppercase, so formatted keys sort the same way as the
//! raw bytes.

use std::fmt::Write;

use crate::storage::btree::{KEY_SIZE, Key};

/// Length of a key in hex characters.
pub const HEX_KEY_LEN: usize = KEY_SIZE * 2;

/// Error returned when parsing a hex key fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    /// Input is not exactly `HEX_KEY_LEN` characters.
    InvalidLength(usize),
    /// Character at `position` is not a hex digit.
    InvalidDigit { position: usize },
}

impl std::fmt::Display for KeyParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLength(len) => {
                write!(f, "expected {HEX_KEY_LEN} hex characters, got {len}")
            }
            Self::InvalidDigit { position } => {
                write!(f, "invalid hex digit at position {position}")
            }
        }
    }
}

impl std::error::Error for KeyParseError {}

/// Parse 40 hex characters into a key.
pub fn parse_hex(text: &str) -> Result<Key, KeyParseError> {
    let bytes = text.as_bytes();
    if bytes.len() != HEX_KEY_LEN {
        return Err(KeyParseError::InvalidLength(bytes.len()));
    }

    let mut key = [0u8; KEY_SIZE];
    for (index, pair) in bytes.chunks_exact(2).enumerate() {
        let high = nibble(pair[0]).ok_or(KeyParseError::InvalidDigit {
            position: index * 2,
        })?;
        let low = nibble(pair[1]).ok_or(KeyParseError::InvalidDigit {
            position: index * 2 + 1,
        })?;
        key[index] = (high << 4) | low;
    }
    Ok(key)
}

/// Format a key as 40 uppercase hex characters.
#[must_use]
pub fn to_hex(key: &Key) -> String {
    key.iter()
        .fold(String::with_capacity(HEX_KEY_LEN), |mut acc, b| {
            let _ = write!(acc, "{b:02X}");
            acc
        })
}

const fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// SPDX-License-Identifier: GPL-3.0-only

/// Why index content could not be turned into a catalog
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("Unrecognized index encoding (leading bytes {0:02x?})")]
    UnknownEncoding(Vec<u8>),

    #[error("Failed to decompress index: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("Unsupported Marshal version {major}.{minor}")]
    BadHeader { major: u8, minor: u8 },

    #[error("Index data ends unexpectedly at byte {0}")]
    Truncated(usize),

    #[error("Unexpected trailing data at byte {0}")]
    TrailingData(usize),

    #[error("Unsupported Marshal type byte 0x{tag:02x} at byte {offset}")]
    UnknownType { tag: u8, offset: usize },

    #[error("Invalid reference {index} at byte {offset}")]
    BadLink { index: usize, offset: usize },

    #[error("Invalid length at byte {0}")]
    BadLength(usize),

    #[error("Nesting too deep at byte {0}")]
    TooDeep(usize),

    #[error("Invalid UTF-8 at byte {0}")]
    InvalidUtf8(usize),

    #[error("Malformed index entry {index}: {reason}")]
    BadEntry { index: usize, reason: String },
}

//! Error types for index decoding and offset resolution

use std::io;
use thiserror::Error;

/// Errors produced while decoding an index or resolving entry offsets.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A record is missing required fields or has values of the wrong type.
    ///
    /// Decoding of the whole index stops at the first malformed record.
    #[error("Malformed index record #{record}: {reason}")]
    Malformed {
        /// Zero-based position of the offending record in the stream
        record: usize,
        /// Human-readable description of the problem
        reason: String,
    },

    /// The requested key is not one of the row's entries.
    #[error("Entry key not found: {0}")]
    KeyNotFound(String),

    /// The entry's absolute range does not fit in a `u64`.
    #[error("Offset overflow for entry {key}: {base:#x} + {offset:#x} + {size:#x}")]
    OffsetOverflow {
        /// Entry key
        key: String,
        /// Row base offset
        base: u64,
        /// Entry offset relative to the row base
        offset: u64,
        /// Entry size in bytes
        size: u64,
    },

    /// Reading the underlying stream failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl IndexError {
    /// Whether this error describes a bad record shape (as opposed to a
    /// lookup or I/O failure).
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Result alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

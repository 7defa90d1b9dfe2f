//! Offset resolution for row entries

use crate::error::{IndexError, Result};
use crate::record::{Entry, IndexRow};
use std::fmt;

/// Absolute half-open byte range `[start, end)` inside an archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// First byte
    pub start: u64,
    /// One past the last byte
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered. Zero when `end` precedes `start`.
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range covers no bytes.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}..{:08X}", self.start, self.end)
    }
}

fn entry_range(base: u64, entry: &Entry) -> Result<ByteRange> {
    let overflow = || IndexError::OffsetOverflow {
        key: entry.key.clone(),
        base,
        offset: entry.relative_offset,
        size: entry.size,
    };
    let start = base.checked_add(entry.relative_offset).ok_or_else(overflow)?;
    let end = start.checked_add(entry.size).ok_or_else(overflow)?;
    Ok(ByteRange { start, end })
}

/// Compute the absolute range of `key` within `row`.
pub fn resolve(row: &IndexRow, key: &str) -> Result<ByteRange> {
    let entry = row
        .entry(key)
        .ok_or_else(|| IndexError::KeyNotFound(key.to_string()))?;
    entry_range(row.base_offset, entry)
}

/// Resolve every entry of `row`, in record order.
pub fn resolve_all(row: &IndexRow) -> impl Iterator<Item = (&str, Result<ByteRange>)> {
    row.entries
        .iter()
        .map(|e| (e.key.as_str(), entry_range(row.base_offset, e)))
}

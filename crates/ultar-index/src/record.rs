//! Index row model and record-shape normalization
//!
//! Index writers have produced two layouts over time. The original writer
//! stores entries as three aligned arrays:
//!
//! ```text
//! { offset, str_idx, iidx, keys: [..], offsets: [..], sizes: [..] }
//! ```
//!
//! Newer writers store one map per entry:
//!
//! ```text
//! { offset, str_idx, iidx, entries: [{ key, offset, size }, ..] }
//! ```
//!
//! Both are decoded into [`RawRecord`], classified as a [`RecordShape`], and
//! normalized into the same [`IndexRow`] before anything else sees them.

use serde::Deserialize;

/// A named byte range inside a row, relative to the row's base offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry name, usually the file extension inside the tar member (`jpg`, `json`)
    pub key: String,
    /// Offset relative to [`IndexRow::base_offset`]
    pub relative_offset: u64,
    /// Size in bytes
    pub size: u64,
}

/// One decoded index record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    /// Absolute offset of the row inside the archive file
    pub base_offset: u64,
    /// String identifier of the row (`str_idx`)
    pub row_id: String,
    /// Ordinal of the row within the shard (`iidx`)
    pub row_ordinal: i64,
    /// Entries in record order
    pub entries: Vec<Entry>,
}

impl IndexRow {
    /// Look up an entry by key.
    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Entry keys in record order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }
}

/// Nested entry as stored by the current writer.
#[derive(Debug, Deserialize)]
pub(crate) struct RawEntry {
    key: String,
    offset: u64,
    size: u64,
}

/// A record exactly as it appears on disk, before shape classification.
#[derive(Debug, Deserialize)]
pub(crate) struct RawRecord {
    offset: u64,
    str_idx: String,
    iidx: i64,
    keys: Option<Vec<String>>,
    offsets: Option<Vec<u64>>,
    sizes: Option<Vec<u64>>,
    entries: Option<Vec<RawEntry>>,
}

/// The two supported entry layouts.
#[derive(Debug)]
pub(crate) enum RecordShape {
    /// Legacy parallel arrays
    Flat {
        keys: Vec<String>,
        offsets: Vec<u64>,
        sizes: Vec<u64>,
    },
    /// One map per entry
    Nested(Vec<RawEntry>),
}

impl RecordShape {
    fn into_entries(self) -> Result<Vec<Entry>, String> {
        match self {
            Self::Flat {
                keys,
                offsets,
                sizes,
            } => {
                if keys.len() != offsets.len() || keys.len() != sizes.len() {
                    return Err(format!(
                        "flat entry arrays differ in length: keys={}, offsets={}, sizes={}",
                        keys.len(),
                        offsets.len(),
                        sizes.len()
                    ));
                }
                Ok(keys
                    .into_iter()
                    .zip(offsets)
                    .zip(sizes)
                    .map(|((key, relative_offset), size)| Entry {
                        key,
                        relative_offset,
                        size,
                    })
                    .collect())
            }
            Self::Nested(entries) => Ok(entries
                .into_iter()
                .map(|e| Entry {
                    key: e.key,
                    relative_offset: e.offset,
                    size: e.size,
                })
                .collect()),
        }
    }
}

impl RawRecord {
    /// Classify the entry layout of this record.
    fn shape(&mut self) -> Result<RecordShape, String> {
        let flat = (self.keys.take(), self.offsets.take(), self.sizes.take());
        match (self.entries.take(), flat) {
            (Some(entries), (None, None, None)) => Ok(RecordShape::Nested(entries)),
            (None, (Some(keys), Some(offsets), Some(sizes))) => Ok(RecordShape::Flat {
                keys,
                offsets,
                sizes,
            }),
            (Some(_), _) => Err("record mixes `entries` with flat entry arrays".to_string()),
            (None, (None, None, None)) => {
                Err("record has neither `entries` nor `keys`/`offsets`/`sizes`".to_string())
            }
            (None, _) => Err("flat record must carry all of `keys`, `offsets` and `sizes`".to_string()),
        }
    }

    /// Normalize into the canonical row model.
    pub(crate) fn into_row(mut self) -> Result<IndexRow, String> {
        let entries = self.shape()?.into_entries()?;
        Ok(IndexRow {
            base_offset: self.offset,
            row_id: self.str_idx,
            row_ordinal: self.iidx,
            entries,
        })
    }
}

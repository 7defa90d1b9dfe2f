//! Streaming index decoder
//!
//! The index stream has no header and no length prefix: records are
//! MessagePack maps written back to back. A clean end of stream is
//! recognized by an empty read buffer at a record boundary; running out of
//! bytes anywhere else is a truncated (malformed) record.

use crate::error::{IndexError, Result};
use crate::record::{IndexRow, RawRecord};
use std::io::{BufRead, BufReader, Read};

/// Lazy, single-pass iterator over the rows of one index stream.
///
/// The iterator is fused: after the first error or the end of the stream it
/// only yields `None`. Callers needing a second pass must reopen the source.
pub struct IndexReader<R: Read> {
    reader: BufReader<R>,
    records: usize,
    done: bool,
}

impl<R: Read> IndexReader<R> {
    /// Wrap a byte stream positioned at the first record.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            records: 0,
            done: false,
        }
    }

    /// Number of records successfully decoded so far.
    pub const fn records_read(&self) -> usize {
        self.records
    }

    fn next_row(&mut self) -> Result<Option<IndexRow>> {
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let record = self.records;
        let raw: RawRecord =
            rmp_serde::from_read(&mut self.reader).map_err(|e| IndexError::Malformed {
                record,
                reason: e.to_string(),
            })?;
        let row = raw
            .into_row()
            .map_err(|reason| IndexError::Malformed { record, reason })?;

        self.records += 1;
        Ok(Some(row))
    }
}

impl<R: Read> Iterator for IndexReader<R> {
    type Item = Result<IndexRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for IndexReader<R> {}

/// Decode a whole index stream.
///
/// Either every record decodes and all rows are returned in stream order,
/// or the first error is returned and no rows are.
pub fn decode_all<R: Read>(reader: R) -> Result<Vec<IndexRow>> {
    IndexReader::new(reader).collect()
}

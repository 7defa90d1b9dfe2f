//! Shard index decoding for ultar datasets.
//!
//! An ultar dataset is a tree of archive files (typically tar shards), each
//! accompanied by an index file named after the archive plus a fixed suffix
//! (`shard.tar` + `.utix`). The index is a headerless sequence of MessagePack
//! maps, one per row, describing where each named entry of that row lives
//! inside the archive.
//!
//! This crate provides two pieces:
//! - [`IndexReader`]: a lazy, single-pass decoder turning an index byte
//!   stream into [`IndexRow`] values
//! - [`resolve`]: the offset resolver computing absolute `[start, end)`
//!   ranges for a row entry
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use ultar_index::{IndexReader, resolve};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("shard.tar.utix")?;
//! for row in IndexReader::new(file) {
//!     let row = row?;
//!     let range = resolve(&row, "jpg")?;
//!     println!("{} -> {range}", row.row_id);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod decoder;
pub mod error;
pub mod record;
pub mod resolve;

pub use decoder::{IndexReader, decode_all};
pub use error::{IndexError, Result};
pub use record::{Entry, IndexRow};
pub use resolve::{ByteRange, resolve, resolve_all};

/// Default suffix of index files (`<archive>.utix`).
pub const INDEX_SUFFIX: &str = ".utix";

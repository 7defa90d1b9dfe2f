//! Cached random access into sharded ultar datasets.
//!
//! An ultar dataset is a directory tree of archive shards, each paired with
//! an index file (`shard.tar` + `shard.tar.utix`). This crate lets a client
//! walk that tree and pull individual entries out of shards without reading
//! whole files.
//!
//! # Architecture
//!
//! - `listing`: bounded cache of directory scans
//! - `mapped`: bounded cache of memory-mapped archives, reference counted
//!   so eviction never unmaps memory under an active reader
//! - `invalidator`: filesystem watches that evict stale cache entries
//! - `service`: [`BrowseService`], tying the caches to a dataset root
//! - `request`: parameter validation and rendering for a web layer
//!
//! Index decoding and offset resolution live in the `ultar-index` crate.
//!
//! # Example
//!
//! ```no_run
//! use ultar_browse::{BrowseConfig, BrowseService};
//!
//! fn main() -> anyhow::Result<()> {
//!     let service = BrowseService::new(&BrowseConfig::new("/datasets/laion"))?;
//!
//!     for entry in service.list("")?.iter() {
//!         println!("{:?} {}", entry.kind, entry.relative_path);
//!     }
//!
//!     let index = service.load_index("part-00000.tar.utix")?;
//!     if let Some((_, Some(range))) = index.rows.first().and_then(|row| row.ranges.first()) {
//!         let bytes = service.read(&index.archive_path, range.start, range.end)?;
//!         println!("{} bytes", bytes.len());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod error;
mod inflight;
pub mod invalidator;
pub mod listing;
pub mod mapped;
pub mod request;
pub mod service;
pub mod stats;

pub use config::BrowseConfig;
pub use error::{BrowseError, Result, StatusClass};
pub use invalidator::{CacheKey, Invalidator, WatchRegistrar, WatchRegistration};
pub use listing::{DirectoryEntry, EntryKind, Listing, ListingCache, ListingStore};
pub use mapped::{MappedFile, MappedFileCache};
pub use request::{
    BufferedResponse, EntryLink, IndexView, QueryParams, RenderedRow, RequestContext,
    ResponseSink,
};
pub use service::{BrowseService, IndexListing, ResolvedRow};
pub use stats::CacheStats;

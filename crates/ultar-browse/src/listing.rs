//! Directory listings and their bounded cache
//!
//! A listing is the sorted set of subdirectories and index files directly
//! under one dataset directory. Listings are cached until the
//! [`crate::Invalidator`] reports a change in that directory; the cache never
//! expires entries on its own.

use crate::error::{BrowseError, Result};
use crate::inflight::Inflight;
use crate::invalidator::{CacheKey, WatchRegistrar};
use crate::stats::{CacheCounters, CacheStats};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Kind of a listed directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Subdirectory
    Dir,
    /// Index file
    File,
}

/// One child of a scanned directory.
///
/// Ordering is directories first, then by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DirectoryEntry {
    /// Entry kind
    pub kind: EntryKind,
    /// File or directory name
    pub name: String,
    /// Path relative to the dataset root, `/`-separated
    pub relative_path: String,
}

/// Shared, immutable result of one directory scan.
pub type Listing = Arc<[DirectoryEntry]>;

/// Join a relative directory and a child name with `/`.
pub(crate) fn join_relative(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Absolute filesystem path of a relative directory under `root`.
pub(crate) fn absolute(root: &Path, relative: &str) -> PathBuf {
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// List the immediate children of `root/dir`.
///
/// Directories (following symlinks) are always listed; other entries only
/// when their name ends with `suffix`. Names that are not valid UTF-8 are
/// skipped.
pub fn scan_directory(root: &Path, dir: &str, suffix: &str) -> Result<Vec<DirectoryEntry>> {
    let full = absolute(root, dir);
    let scan_err = |source| BrowseError::Scan {
        path: full.clone(),
        source,
    };

    let mut entries = Vec::new();
    for child in std::fs::read_dir(&full).map_err(scan_err)? {
        let child = child.map_err(scan_err)?;
        let name = match child.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                debug!("Skipping non UTF-8 entry {:?} in {}", raw, full.display());
                continue;
            }
        };

        let kind = if child.path().is_dir() {
            EntryKind::Dir
        } else if name.ends_with(suffix) {
            EntryKind::File
        } else {
            continue;
        };

        entries.push(DirectoryEntry {
            kind,
            relative_path: join_relative(dir, &name),
            name,
        });
    }

    entries.sort();
    Ok(entries)
}

/// The LRU store behind a [`ListingCache`], keyed by relative directory.
///
/// Split out so the invalidator can evict entries without holding the
/// cache (and its watch registrar) itself.
pub struct ListingStore {
    entries: Mutex<LruCache<String, Listing>>,
    // Bumped under `entries` by every explicit eviction.
    invalidations: AtomicU64,
    counters: CacheCounters,
    capacity: NonZeroUsize,
}

impl ListingStore {
    /// Create a store holding at most `capacity` listings.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            invalidations: AtomicU64::new(0),
            counters: CacheCounters::default(),
            capacity,
        }
    }

    /// Current invalidation epoch. Take it before scanning and hand it to
    /// [`ListingStore::insert_if_current`].
    fn epoch(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    fn get(&self, dir: &str) -> Option<Listing> {
        self.entries.lock().get(dir).cloned()
    }

    /// Cache `listing` unless an eviction happened since `epoch` was taken.
    ///
    /// A scan that overlapped an eviction may predate the change that caused
    /// it, so its result is returned to the caller but not cached.
    fn insert_if_current(&self, dir: String, listing: Listing, epoch: u64) -> bool {
        let mut entries = self.entries.lock();
        if self.invalidations.load(Ordering::Relaxed) != epoch {
            debug!("Listing '{}' changed during scan, not caching", dir);
            return false;
        }
        let displaced = entries.push(dir.clone(), listing);
        drop(entries);
        if let Some((old_dir, _)) = displaced
            && old_dir != dir
        {
            self.counters.evict();
            debug!("Evicted least recently used listing '{}'", old_dir);
        }
        true
    }

    /// Remove the listing for `dir`. Returns whether one was cached.
    ///
    /// Scans of any directory already in progress are not cached.
    pub fn evict(&self, dir: &str) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            entries.pop(dir).is_some()
        };
        if removed {
            self.counters.evict();
            debug!("Evicted listing '{}'", dir);
        }
        removed
    }

    /// Remove every cached listing.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        for _ in 0..entries.len() {
            self.counters.evict();
        }
        entries.clear();
    }

    /// Whether a listing for `dir` is cached. Does not affect recency.
    pub fn contains(&self, dir: &str) -> bool {
        self.entries.lock().contains(dir)
    }

    /// Number of cached listings.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no listing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len(), self.capacity.get())
    }
}

/// Fill-on-miss cache of directory listings under one dataset root.
pub struct ListingCache {
    root: PathBuf,
    suffix: String,
    store: Arc<ListingStore>,
    inflight: Inflight<String>,
    registrar: Arc<dyn WatchRegistrar>,
}

impl ListingCache {
    /// Create a listing cache for `root`, storing results in `store` and
    /// registering a watch through `registrar` for every scanned directory.
    pub fn new(
        root: impl Into<PathBuf>,
        suffix: impl Into<String>,
        store: Arc<ListingStore>,
        registrar: Arc<dyn WatchRegistrar>,
    ) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
            store,
            inflight: Inflight::new(),
            registrar,
        }
    }

    /// Return the listing of `dir` (`""` for the root), scanning on a miss.
    ///
    /// `dir` must already be a normalized relative path. Concurrent misses
    /// on the same directory perform a single scan.
    pub fn get_or_scan(&self, dir: &str) -> Result<Listing> {
        if let Some(listing) = self.store.get(dir) {
            self.store.counters.hit();
            return Ok(listing);
        }
        self.store.counters.miss();

        let key = dir.to_string();
        let _gate = self.inflight.acquire(&key);
        if let Some(listing) = self.store.get(dir) {
            return Ok(listing);
        }

        // Watch first so a change racing the scan still evicts.
        let watched = absolute(&self.root, dir);
        if watched.is_dir()
            && let Err(e) = self
                .registrar
                .register(&watched, CacheKey::Listing(key.clone()))
        {
            warn!("Failed to watch {}: {}", watched.display(), e);
        }

        let epoch = self.store.epoch();
        let listing: Listing = scan_directory(&self.root, dir, &self.suffix)?.into();
        self.store.counters.populate();
        debug!("Scanned '{}': {} entries", dir, listing.len());
        self.store.insert_if_current(key, Arc::clone(&listing), epoch);

        Ok(listing)
    }

    /// Evict the listing of `dir`.
    pub fn evict(&self, dir: &str) -> bool {
        self.store.evict(dir)
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<ListingStore> {
        &self.store
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}

//! Memory-mapped archive files and their bounded cache
//!
//! Each archive is opened read-only and mapped in full. Mappings are shared
//! as `Arc<MappedFile>`: the cache holds one reference and every in-flight
//! read holds another, so evicting an entry never unmaps memory a reader is
//! still copying from. The mapping is released when the last reference
//! drops.

use crate::error::{BrowseError, Result};
use crate::inflight::Inflight;
use crate::stats::{CacheCounters, CacheStats};
use bytes::Bytes;
use lru::LruCache;
use memmap2::{Mmap, MmapOptions};
use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A read-only mapping of one archive file.
pub struct MappedFile {
    path: PathBuf,
    mmap: Mmap,
    // Kept open for the lifetime of the mapping.
    _file: File,
}

impl MappedFile {
    /// Open `path` read-only and map its full current length.
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |source| BrowseError::Open {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(open_err)?;
        let metadata = file.metadata().map_err(open_err)?;
        if !metadata.is_file() {
            return Err(open_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let size = metadata.len();
        if size == 0 {
            return Err(BrowseError::Map {
                path: path.to_path_buf(),
                reason: "cannot map an empty file".to_string(),
            });
        }
        if usize::try_from(size).is_err() {
            return Err(BrowseError::Map {
                path: path.to_path_buf(),
                reason: format!("file of {size} bytes exceeds the address space"),
            });
        }

        // SAFETY: the mapping is read-only and archives are never written by
        // this process. Concurrent truncation by another process is the
        // usual mmap caveat and is not guarded against.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| BrowseError::Map {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        #[cfg(unix)]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Random);
        }

        debug!("Mapped archive {} ({} bytes)", path.display(), size);

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            _file: file,
        })
    }

    /// Path the mapping was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the mapping in bytes.
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Always false: empty files are never mapped.
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Borrow `[start, end)` of the mapping.
    pub fn slice(&self, start: u64, end: u64) -> Result<&[u8]> {
        let len = self.len();
        if start > end || end > len {
            return Err(BrowseError::Range {
                path: self.path.clone(),
                start,
                end,
                len,
            });
        }
        // Both bounds are <= len, which fits in usize.
        Ok(&self.mmap[start as usize..end as usize])
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        debug!("Unmapping archive {}", self.path.display());
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("path", &self.path)
            .field("len", &self.mmap.len())
            .finish_non_exhaustive()
    }
}

/// Bounded LRU cache of mapped archive files keyed by path.
pub struct MappedFileCache {
    entries: Mutex<LruCache<PathBuf, Arc<MappedFile>>>,
    // Bumped under `entries` by every explicit eviction.
    invalidations: AtomicU64,
    inflight: Inflight<PathBuf>,
    counters: CacheCounters,
    capacity: NonZeroUsize,
}

impl MappedFileCache {
    /// Create a cache holding at most `capacity` mappings.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            invalidations: AtomicU64::new(0),
            inflight: Inflight::new(),
            counters: CacheCounters::default(),
            capacity,
        }
    }

    fn lookup(&self, path: &Path) -> Option<Arc<MappedFile>> {
        self.entries.lock().get(path).cloned()
    }

    /// Return the cached mapping for `path`, opening and mapping it on a miss.
    ///
    /// Concurrent misses on the same path perform a single open; the other
    /// callers wait and share the result. On failure nothing is cached.
    pub fn get_or_open(&self, path: &Path) -> Result<Arc<MappedFile>> {
        if let Some(mapped) = self.lookup(path) {
            self.counters.hit();
            return Ok(mapped);
        }
        self.counters.miss();

        let key = path.to_path_buf();
        let _gate = self.inflight.acquire(&key);
        if let Some(mapped) = self.lookup(path) {
            return Ok(mapped);
        }

        let epoch = self.invalidations.load(Ordering::Relaxed);
        let mapped = Arc::new(MappedFile::open(path)?);
        self.counters.populate();
        self.insert_if_current(key, Arc::clone(&mapped), epoch);

        Ok(mapped)
    }

    /// Cache `mapped` unless an eviction happened since `epoch` was taken.
    ///
    /// An open that overlapped an eviction may have mapped the file as it
    /// was before the change, so the mapping serves its caller only.
    fn insert_if_current(&self, key: PathBuf, mapped: Arc<MappedFile>, epoch: u64) -> bool {
        let mut entries = self.entries.lock();
        if self.invalidations.load(Ordering::Relaxed) != epoch {
            debug!("{} changed while opening, not caching", key.display());
            return false;
        }
        let displaced = entries.push(key.clone(), mapped);
        drop(entries);

        if let Some((old_path, old)) = displaced
            && old_path != key
        {
            self.counters.evict();
            debug!(
                "Evicted least recently used mapping {} ({} readers left)",
                old_path.display(),
                Arc::strong_count(&old) - 1
            );
        }
        true
    }

    /// Copy `[start, end)` out of the archive at `path`.
    ///
    /// The mapping stays pinned for the duration of the copy. An out of
    /// bounds request fails with [`BrowseError::Range`] and leaves the
    /// cached mapping in place.
    pub fn read_range(&self, path: &Path, start: u64, end: u64) -> Result<Bytes> {
        let mapped = self.get_or_open(path)?;
        let bytes = Bytes::copy_from_slice(mapped.slice(start, end)?);
        Ok(bytes)
    }

    /// Drop the cache's reference to `path`. Returns whether an entry existed.
    ///
    /// Opens already in progress are not cached.
    pub fn evict(&self, path: &Path) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            entries.pop(path)
        };
        match removed {
            Some(mapped) => {
                self.counters.evict();
                debug!(
                    "Evicted mapping {} ({} readers left)",
                    path.display(),
                    Arc::strong_count(&mapped) - 1
                );
                true
            }
            None => false,
        }
    }

    /// Whether `path` is currently mapped. Does not affect recency.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.lock().contains(path)
    }

    /// Number of cached mappings.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached mapping.
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            let mut drained = Vec::with_capacity(entries.len());
            while let Some(entry) = entries.pop_lru() {
                drained.push(entry);
            }
            drained
        };
        for _ in &drained {
            self.counters.evict();
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len(), self.capacity.get())
    }
}

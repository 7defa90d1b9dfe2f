//! Cache statistics
//!
//! Each cache owns a [`CacheCounters`] updated with relaxed atomics on the
//! hot path and exposes point-in-time [`CacheStats`] snapshots.

#![allow(clippy::cast_precision_loss)] // Ratios intentionally accept precision loss

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one cache.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    populates: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    #[inline]
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn populate(&self) {
        self.populates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn evict(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize, capacity: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            populates: self.populates.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
            capacity,
        }
    }
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that found no entry
    pub misses: u64,
    /// Underlying scans or open+map calls performed
    pub populates: u64,
    /// Entries removed, by capacity pressure or invalidation
    pub evictions: u64,
    /// Entries currently cached
    pub entries: usize,
    /// Maximum number of entries
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0.0 when idle).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

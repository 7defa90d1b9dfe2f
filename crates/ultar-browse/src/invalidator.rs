//! Filesystem-driven cache invalidation
//!
//! Every directory that has been scanned gets one non-recursive watch for the
//! lifetime of the process; with archive watching enabled, every mapped
//! archive file gets one too. Any notification (create, delete, modify,
//! rename: the kind is ignored) for a watched path, or for a direct child of
//! one, evicts the cache entry registered for that path.
//!
//! Notifications arrive on the watcher's own thread. Lock order is
//! watcher, then registry; the callback only ever takes the registry (and
//! releases it before touching a cache), so a callback can never block a
//! registration that is waiting on the watcher thread.

use crate::error::Result;
use crate::listing::ListingStore;
use crate::mapped::MappedFileCache;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which cache entry a watched path invalidates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Listing cache entry, keyed by relative directory (`""` is the root)
    Listing(String),
    /// Mapped-file cache entry, keyed by absolute archive path
    Archive(PathBuf),
}

/// One registered watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    /// Absolute path being watched
    pub watched_path: PathBuf,
    /// Cache entry evicted when the path changes
    pub cache_key: CacheKey,
}

/// Registers change watches on behalf of a cache.
pub trait WatchRegistrar: Send + Sync {
    /// Watch `watched_path`, evicting `cache_key` on change.
    ///
    /// Idempotent per path: returns `Ok(false)` when the path is already
    /// watched.
    fn register(&self, watched_path: &Path, cache_key: CacheKey) -> Result<bool>;
}

/// Caches that notifications evict from, plus the registry mapping watched
/// paths to their cache keys.
struct Targets {
    listings: Arc<ListingStore>,
    archives: Arc<MappedFileCache>,
    registry: RwLock<HashMap<PathBuf, WatchRegistration>>,
}

impl Targets {
    /// Evict whatever is registered for `path` or its parent directory.
    fn dispatch(&self, path: &Path) -> usize {
        let keys: Vec<CacheKey> = {
            let registry = self.registry.read();
            [Some(path), path.parent()]
                .into_iter()
                .flatten()
                .filter_map(|p| registry.get(p))
                .map(|r| r.cache_key.clone())
                .collect()
        };

        keys.iter()
            .filter(|key| match key {
                CacheKey::Listing(dir) => self.listings.evict(dir),
                CacheKey::Archive(archive) => self.archives.evict(archive),
            })
            .count()
    }

    fn handle(&self, event: notify::Result<Event>) {
        match event {
            Ok(event) => {
                if event.need_rescan() {
                    debug!("Watcher requested rescan, dropping all listings");
                    self.listings.clear();
                }
                for path in &event.paths {
                    let evicted = self.dispatch(path);
                    if evicted > 0 {
                        debug!("{:?} on {}: evicted {evicted}", event.kind, path.display());
                    }
                }
            }
            Err(e) => warn!("Filesystem watcher error: {}", e),
        }
    }
}

/// Evicts cache entries when watched paths change.
pub struct Invalidator {
    watcher: Mutex<Option<RecommendedWatcher>>,
    targets: Arc<Targets>,
}

impl Invalidator {
    /// Create an invalidator backed by the platform's recommended watcher.
    pub fn new(listings: Arc<ListingStore>, archives: Arc<MappedFileCache>) -> Result<Self> {
        let invalidator = Self::detached(listings, archives);
        let targets = Arc::clone(&invalidator.targets);
        let watcher = recommended_watcher(move |event: notify::Result<Event>| targets.handle(event))?;
        *invalidator.watcher.lock() = Some(watcher);
        Ok(invalidator)
    }

    /// Create an invalidator that records registrations but installs no OS
    /// watches. Only [`Invalidator::notify_changed`] triggers evictions.
    pub fn detached(listings: Arc<ListingStore>, archives: Arc<MappedFileCache>) -> Self {
        Self {
            watcher: Mutex::new(None),
            targets: Arc::new(Targets {
                listings,
                archives,
                registry: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Whether OS-level notifications are being delivered.
    pub fn is_live(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Report a change to `path` as if the watcher had delivered it.
    ///
    /// Returns the number of cache entries evicted.
    pub fn notify_changed(&self, path: &Path) -> usize {
        self.targets.dispatch(path)
    }

    /// Whether `path` has a registered watch.
    pub fn is_watched(&self, path: &Path) -> bool {
        self.targets.registry.read().contains_key(path)
    }

    /// Number of registered watches.
    pub fn watch_count(&self) -> usize {
        self.targets.registry.read().len()
    }

    /// Snapshot of all registrations.
    pub fn registrations(&self) -> Vec<WatchRegistration> {
        self.targets.registry.read().values().cloned().collect()
    }
}

impl WatchRegistrar for Invalidator {
    fn register(&self, watched_path: &Path, cache_key: CacheKey) -> Result<bool> {
        // Serializes registrations; never held by the notification callback.
        let mut watcher = self.watcher.lock();
        if self.is_watched(watched_path) {
            return Ok(false);
        }

        if let Some(watcher) = watcher.as_mut() {
            watcher.watch(watched_path, RecursiveMode::NonRecursive)?;
        }

        debug!("Watching {} for {:?}", watched_path.display(), cache_key);
        self.targets.registry.write().insert(
            watched_path.to_path_buf(),
            WatchRegistration {
                watched_path: watched_path.to_path_buf(),
                cache_key,
            },
        );
        Ok(true)
    }
}

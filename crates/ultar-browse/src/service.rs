//! Browse/read orchestration.
//!
//! [`BrowseService`] wires the listing cache, the mapped-file cache and the
//! invalidator together under one dataset root and answers the three
//! request kinds: list a directory, load an index, read a byte range.

use crate::config::BrowseConfig;
use crate::error::{BrowseError, Result};
use crate::invalidator::{CacheKey, Invalidator, WatchRegistrar};
use crate::listing::{ListingCache, ListingStore, Listing, absolute};
use crate::mapped::MappedFileCache;
use crate::stats::CacheStats;
use bytes::Bytes;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use ultar_index::{ByteRange, IndexError, IndexRow, decode_all, resolve, resolve_all};

/// A decoded row together with the absolute range of each entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRow {
    /// The decoded row
    pub row: IndexRow,
    /// `(key, range)` per entry, in record order. `None` when the entry's
    /// offsets overflow; the rest of the row stays usable.
    pub ranges: Vec<(String, Option<ByteRange>)>,
}

/// Fully decoded index of one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexListing {
    /// Index path relative to the dataset root
    pub index_path: String,
    /// Archive path relative to the dataset root (index path minus suffix)
    pub archive_path: String,
    /// Rows in index order
    pub rows: Vec<ResolvedRow>,
}

/// Normalize a caller-supplied relative path to `/`-separated components.
///
/// Empty and `.` components are dropped. Absolute paths and `..` are
/// rejected so every request stays under the dataset root.
pub fn normalize_relative(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| BrowseError::path(path, "path is not valid UTF-8"))?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(BrowseError::path(path, "parent components are not allowed"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(BrowseError::path(path, "path must be relative to the data root"));
            }
        }
    }
    Ok(parts.join("/"))
}

/// Cached random-access browser over one dataset tree.
pub struct BrowseService {
    root: PathBuf,
    suffix: String,
    listings: ListingCache,
    archives: Arc<MappedFileCache>,
    invalidator: Arc<Invalidator>,
    watch_archives: bool,
}

impl BrowseService {
    /// Build a service from `config`.
    ///
    /// The data root is canonicalized once so watch paths match the paths
    /// reported by the OS.
    pub fn new(config: &BrowseConfig) -> Result<Self> {
        config.validate()?;

        let root = std::fs::canonicalize(&config.data_path).map_err(|e| {
            BrowseError::Config(format!(
                "cannot resolve data path {}: {e}",
                config.data_path.display()
            ))
        })?;

        let store = Arc::new(ListingStore::new(config.listing_capacity()?));
        let archives = Arc::new(MappedFileCache::new(config.mapping_capacity()?));
        let invalidator = Arc::new(if config.watch {
            Invalidator::new(Arc::clone(&store), Arc::clone(&archives))?
        } else {
            Invalidator::detached(Arc::clone(&store), Arc::clone(&archives))
        });
        let registrar: Arc<dyn WatchRegistrar> = invalidator.clone();
        let listings = ListingCache::new(&root, config.index_suffix.clone(), store, registrar);

        info!(
            "Browsing {} (listings={}, mappings={}, watch={}, watch_archives={})",
            root.display(),
            config.listing_capacity,
            config.mapping_capacity,
            config.watch,
            config.watch_archives
        );

        Ok(Self {
            root,
            suffix: config.index_suffix.clone(),
            listings,
            archives,
            invalidator,
            watch_archives: config.watch_archives,
        })
    }

    /// Canonical dataset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Index file suffix.
    pub fn index_suffix(&self) -> &str {
        &self.suffix
    }

    /// List a directory relative to the root (`""` for the root itself).
    pub fn list(&self, dir: &str) -> Result<Listing> {
        let dir = normalize_relative(dir)?;
        self.listings.get_or_scan(&dir)
    }

    /// Archive path for an index path, both relative to the root.
    pub fn archive_path_for(&self, index_path: &str) -> Result<String> {
        let index_path = normalize_relative(index_path)?;
        match index_path.strip_suffix(self.suffix.as_str()) {
            Some(archive) if !archive.is_empty() && !archive.ends_with('/') => {
                Ok(archive.to_string())
            }
            _ => Err(BrowseError::path(
                index_path.as_str(),
                format!("index file name must end with '{}'", self.suffix),
            )),
        }
    }

    /// Decode the index at `index_path` and resolve every entry's range.
    ///
    /// The index is read fresh on every call; only archives are cached.
    pub fn load_index(&self, index_path: &str) -> Result<IndexListing> {
        let archive_path = self.archive_path_for(index_path)?;
        let index_path = normalize_relative(index_path)?;
        let full = absolute(&self.root, &index_path);

        let file = File::open(&full).map_err(|source| BrowseError::Open {
            path: full.clone(),
            source,
        })?;
        let rows = decode_all(file).map_err(|e| match e {
            IndexError::Io(source) => BrowseError::Open {
                path: full.clone(),
                source,
            },
            source => BrowseError::MalformedIndex {
                path: full.clone(),
                source,
            },
        })?;

        let rows: Vec<ResolvedRow> = rows
            .into_iter()
            .map(|row| {
                let ranges = resolve_all(&row)
                    .map(|(key, range)| match range {
                        Ok(range) => (key.to_string(), Some(range)),
                        Err(e) => {
                            warn!("{}: row '{}': {}", full.display(), row.row_id, e);
                            (key.to_string(), None)
                        }
                    })
                    .collect();
                ResolvedRow { row, ranges }
            })
            .collect();

        debug!("Loaded {} rows from {}", rows.len(), full.display());
        Ok(IndexListing {
            index_path,
            archive_path,
            rows,
        })
    }

    /// Absolute range of entry `key` in the row with id `row_id`.
    ///
    /// An entry whose offsets overflow fails with
    /// [`BrowseError::MalformedIndex`].
    pub fn entry_range(&self, index_path: &str, row_id: &str, key: &str) -> Result<ByteRange> {
        let index = self.load_index(index_path)?;
        let row = index
            .rows
            .iter()
            .find(|r| r.row.row_id == row_id)
            .ok_or_else(|| BrowseError::NotFound(format!("row '{row_id}' in {index_path}")))?;
        resolve(&row.row, key).map_err(|e| match e {
            IndexError::KeyNotFound(_) => {
                BrowseError::NotFound(format!("entry '{key}' in row '{row_id}'"))
            }
            source => BrowseError::MalformedIndex {
                path: absolute(&self.root, &index.index_path),
                source,
            },
        })
    }

    /// Absolute cache key of an archive path relative to the root.
    pub fn archive_key(&self, archive_path: &str) -> Result<PathBuf> {
        let relative = normalize_relative(archive_path)?;
        if relative.is_empty() {
            return Err(BrowseError::path(archive_path, "archive path is empty"));
        }
        Ok(self.root.join(relative))
    }

    /// Copy `[start, end)` out of the archive at `archive_path`.
    pub fn read(&self, archive_path: &str, start: u64, end: u64) -> Result<Bytes> {
        let key = self.archive_key(archive_path)?;
        let bytes = self.archives.read_range(&key, start, end)?;

        if self.watch_archives
            && let Err(e) = self
                .invalidator
                .register(&key, CacheKey::Archive(key.clone()))
        {
            warn!("Failed to watch archive {}: {}", key.display(), e);
        }

        Ok(bytes)
    }

    /// The listing cache.
    pub fn listings(&self) -> &ListingCache {
        &self.listings
    }

    /// The mapped-file cache.
    pub fn archives(&self) -> &MappedFileCache {
        &self.archives
    }

    /// The invalidator.
    pub fn invalidator(&self) -> &Invalidator {
        &self.invalidator
    }

    /// `(listing, mapping)` cache statistics.
    pub fn stats(&self) -> (CacheStats, CacheStats) {
        (self.listings.stats(), self.archives.stats())
    }
}

//! Browser configuration.
//!
//! Configuration can be provided via:
//! - CLI arguments (`--data-path`, `--listing-capacity`, etc.)
//! - Environment variables (`ULTAR_DATA_PATH`, etc.)
//! - The builder methods on [`BrowseConfig`] when embedding the library
//!
//! # Example
//!
//! ```no_run
//! use ultar_browse::BrowseConfig;
//!
//! let config = BrowseConfig::new("/datasets/laion")
//!     .with_mapping_capacity(32)
//!     .with_watch_archives(true);
//! config.validate().expect("Invalid configuration");
//! ```

use crate::error::{BrowseError, Result};
use clap::Args;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use ultar_index::INDEX_SUFFIX;

/// Default number of cached directory listings.
pub const DEFAULT_LISTING_CAPACITY: usize = 128;

/// Default number of simultaneously mapped archive files.
pub const DEFAULT_MAPPING_CAPACITY: usize = 16;

/// Cache and watch settings for a [`crate::BrowseService`].
#[derive(Debug, Clone, Args)]
pub struct BrowseConfig {
    /// Root of the dataset tree to browse
    #[arg(long, env = "ULTAR_DATA_PATH", default_value = ".")]
    pub data_path: PathBuf,

    /// Maximum number of cached directory listings
    #[arg(long, env = "ULTAR_LISTING_CAPACITY", default_value_t = DEFAULT_LISTING_CAPACITY)]
    pub listing_capacity: usize,

    /// Maximum number of memory-mapped archive files kept open
    #[arg(long, env = "ULTAR_MAPPING_CAPACITY", default_value_t = DEFAULT_MAPPING_CAPACITY)]
    pub mapping_capacity: usize,

    /// Suffix identifying index files (`<archive><suffix>`)
    #[arg(long, env = "ULTAR_INDEX_SUFFIX", default_value = INDEX_SUFFIX)]
    pub index_suffix: String,

    /// Disable filesystem change notifications
    #[arg(long = "no-watch", action = clap::ArgAction::SetFalse)]
    pub watch: bool,

    /// Also evict mapped archives when the archive file changes
    #[arg(long, env = "ULTAR_WATCH_ARCHIVES")]
    pub watch_archives: bool,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("."),
            listing_capacity: DEFAULT_LISTING_CAPACITY,
            mapping_capacity: DEFAULT_MAPPING_CAPACITY,
            index_suffix: INDEX_SUFFIX.to_string(),
            watch: true,
            watch_archives: false,
        }
    }
}

impl BrowseConfig {
    /// Create a configuration rooted at `data_path`.
    pub fn new<P: AsRef<Path>>(data_path: P) -> Self {
        Self {
            data_path: data_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the listing cache capacity
    #[must_use]
    pub const fn with_listing_capacity(mut self, capacity: usize) -> Self {
        self.listing_capacity = capacity;
        self
    }

    /// Set the mapped-file cache capacity
    #[must_use]
    pub const fn with_mapping_capacity(mut self, capacity: usize) -> Self {
        self.mapping_capacity = capacity;
        self
    }

    /// Set the index file suffix
    #[must_use]
    pub fn with_index_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.index_suffix = suffix.into();
        self
    }

    /// Enable or disable filesystem watches
    #[must_use]
    pub const fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Enable or disable archive file watches
    #[must_use]
    pub const fn with_watch_archives(mut self, watch_archives: bool) -> Self {
        self.watch_archives = watch_archives;
        self
    }

    pub(crate) fn listing_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.listing_capacity)
            .ok_or_else(|| BrowseError::Config("listing capacity must be at least 1".to_string()))
    }

    pub(crate) fn mapping_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.mapping_capacity)
            .ok_or_else(|| BrowseError::Config("mapping capacity must be at least 1".to_string()))
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `BrowseError::Config` if:
    /// - Either cache capacity is zero
    /// - The index suffix is empty
    /// - The data path is not an existing directory
    pub fn validate(&self) -> Result<()> {
        self.listing_capacity()?;
        self.mapping_capacity()?;

        if self.index_suffix.is_empty() {
            return Err(BrowseError::Config(
                "index suffix must not be empty".to_string(),
            ));
        }

        if !self.data_path.is_dir() {
            return Err(BrowseError::Config(format!(
                "data path is not a directory: {}",
                self.data_path.display()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowseConfig::default();
        assert_eq!(config.listing_capacity, 128);
        assert_eq!(config.mapping_capacity, 16);
        assert_eq!(config.index_suffix, ".utix");
        assert!(config.watch);
        assert!(!config.watch_archives);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrowseConfig::new(dir.path()).with_mapping_capacity(0);
        assert!(matches!(config.validate(), Err(BrowseError::Config(_))));

        let config = BrowseConfig::new(dir.path()).with_listing_capacity(0);
        assert!(matches!(config.validate(), Err(BrowseError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrowseConfig::new(dir.path().join("absent"));
        assert!(config.validate().is_err());

        let config = BrowseConfig::new(dir.path()).with_index_suffix("");
        assert!(config.validate().is_err());

        assert!(BrowseConfig::new(dir.path()).validate().is_ok());
    }
}

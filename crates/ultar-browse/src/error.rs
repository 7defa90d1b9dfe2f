//! Error types for the browse/read service.
//!
//! All errors are returned as typed results; nothing in this crate retries.
//! [`BrowseError::status_class`] tells a web layer how to surface each one.

use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use ultar_index::IndexError;

/// Errors returned by the caches, the invalidator and the service.
#[derive(Debug, Error)]
pub enum BrowseError {
    /// Index file has a bad record shape
    #[error("Malformed index {path}: {source}")]
    MalformedIndex {
        /// Index file being decoded
        path: PathBuf,
        /// Decoder error
        #[source]
        source: IndexError,
    },

    /// Entry key or row lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request path could not be joined or has no index suffix
    #[error("Invalid path '{path}': {reason}")]
    Path {
        /// Offending path as given by the caller
        path: String,
        /// Reason for rejection
        reason: String,
    },

    /// File could not be opened
    #[error("Failed to open {path}: {source}")]
    Open {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File could not be memory-mapped
    #[error("Failed to map {path}: {reason}")]
    Map {
        /// File path
        path: PathBuf,
        /// Reason for failure
        reason: String,
    },

    /// Requested byte range lies outside the mapped file
    #[error("Byte range {start:#x}..{end:#x} out of bounds for {path} (length {len:#x})")]
    Range {
        /// File path
        path: PathBuf,
        /// Requested start
        start: u64,
        /// Requested end
        end: u64,
        /// Mapped length
        len: u64,
    },

    /// Required request parameter missing or unparsable
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// Directory scan failed
    #[error("Failed to scan directory {path}: {source}")]
    Scan {
        /// Directory path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Filesystem watch could not be created or registered
    #[error("Watch error: {0}")]
    Watch(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of an error for response mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The request was wrong (4xx)
    ClientError,
    /// The server could not fulfil a valid request (5xx)
    ServerError,
}

impl BrowseError {
    /// How the web layer should surface this error.
    ///
    /// A scan of a directory that does not exist, or of a path that is not a
    /// directory, is the caller's mistake like any other bad path.
    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::MalformedIndex { .. }
            | Self::NotFound(_)
            | Self::Path { .. }
            | Self::Open { .. }
            | Self::Range { .. }
            | Self::BadArgument(_) => StatusClass::ClientError,
            Self::Scan { source, .. } => match source.kind() {
                ErrorKind::NotFound | ErrorKind::NotADirectory => StatusClass::ClientError,
                _ => StatusClass::ServerError,
            },
            Self::Map { .. } | Self::Watch(_) | Self::Config(_) => StatusClass::ServerError,
        }
    }

    pub(crate) fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<notify::Error> for BrowseError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

/// Result type for browse operations.
pub type Result<T> = std::result::Result<T, BrowseError>;

//! Error surface for chunk operations.
//!
//! `FsError` covers per-request failures and maps onto errno values at the
//! FUSE boundary. `ConfigError` covers everything that must abort startup
//! before a mount exists: bad geometry, an unusable image, failed size
//! discovery.

use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct PathHint(Option<String>);

impl PathHint {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn some(path: impl Into<String>) -> Self {
        Self(Some(path.into()))
    }
}

impl fmt::Display for PathHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(path) if !path.is_empty() => write!(f, ": {path}"),
            _ => Ok(()),
        }
    }
}

impl From<String> for PathHint {
    fn from(value: String) -> Self {
        Self::some(value)
    }
}

impl From<&str> for PathHint {
    fn from(value: &str) -> Self {
        Self::some(value)
    }
}

#[derive(Error, Debug)]
pub enum FsError {
    /// Malformed or out-of-range path, or an inode the encoder never issued.
    #[error("not found{path}")]
    NotFound { path: PathHint },

    #[error("not a directory{path}")]
    NotADirectory { path: PathHint },

    #[error("is a directory{path}")]
    IsADirectory { path: PathHint },

    #[error("read-only filesystem")]
    ReadOnly,

    /// Write or grow-truncate past the chunk's logical end.
    #[error("beyond chunk end (requested {requested}, chunk holds {logical_size} bytes)")]
    FileTooBig { requested: u64, logical_size: u64 },

    /// Structural mutation of the frozen tree.
    #[error("permission denied{path}")]
    PermissionDenied { path: PathHint },

    /// Backing store failure, including short transfers.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("chunk size {0} is invalid: must be a multiple of 4096, at least 4096")]
    InvalidChunkSize(u64),

    #[error("image holds {chunks} chunks, more than the {max} addressable by three path levels")]
    AddressSpaceExceeded { chunks: u64, max: u64 },

    #[error("{path}: not a regular file or block device")]
    UnsupportedImage { path: String },

    #[error("failed to open image {path}")]
    OpenImage {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to determine size of {path}")]
    SizeDiscovery {
        path: String,
        #[source]
        source: io::Error,
    },
}

//! Image geometry and the stat snapshot attribute synthesis inherits from.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

use crate::error::ConfigError;

/// Default chunk size, overridable from the command line.
pub const DEFAULT_CHUNK_SIZE: u64 = 1 << 20;

/// Chunk sizes must be multiples of this.
pub const CHUNK_ALIGN: u64 = 4096;

/// Three hex-pair path levels address at most 2^24 chunks.
pub const MAX_CHUNKS: u64 = 1 << 24;

/// Fixed geometry of the mounted image. Validated once, immutable afterwards,
/// shared freely across workers.
#[derive(Debug, Clone, Copy)]
pub struct ImageConfig {
    pub chunk_size: u64,
    pub image_size: u64,
    /// `ceil(image_size / chunk_size)`; the last chunk is usually short.
    pub chunk_count: u64,
    pub readonly: bool,
}

impl ImageConfig {
    pub fn new(chunk_size: u64, image_size: u64, readonly: bool) -> Result<Self, ConfigError> {
        if chunk_size < CHUNK_ALIGN || chunk_size % CHUNK_ALIGN != 0 {
            return Err(ConfigError::InvalidChunkSize(chunk_size));
        }
        let chunk_count = image_size.div_ceil(chunk_size);
        if chunk_count > MAX_CHUNKS {
            return Err(ConfigError::AddressSpaceExceeded {
                chunks: chunk_count,
                max: MAX_CHUNKS,
            });
        }
        Ok(Self {
            chunk_size,
            image_size,
            chunk_count,
            readonly,
        })
    }
}

/// Snapshot of the image file's own stat, taken once at open. Every
/// synthesized node reports these ownership/permission/time fields.
#[derive(Debug, Clone, Copy)]
pub struct ImageStat {
    pub uid: u32,
    pub gid: u32,
    /// Permission bits only (`mode & 0o7777`).
    pub mode: u32,
    /// Unix nanoseconds.
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl ImageStat {
    pub fn from_metadata(md: &Metadata) -> Self {
        Self {
            uid: md.uid(),
            gid: md.gid(),
            mode: md.mode() & 0o7777,
            atime: unix_nanos(md.atime(), md.atime_nsec()),
            mtime: unix_nanos(md.mtime(), md.mtime_nsec()),
            ctime: unix_nanos(md.ctime(), md.ctime_nsec()),
        }
    }
}

fn unix_nanos(sec: i64, nsec: i64) -> i64 {
    sec.saturating_mul(1_000_000_000).saturating_add(nsec)
}

//! Memory-mapped store for regular-file images.

use std::fs::File;
use std::io;
use std::sync::RwLock;

use async_trait::async_trait;
use memmap2::{Mmap, MmapMut, MmapOptions};

use super::BackingStore;

enum Map {
    Ro(Mmap),
    Rw(RwLock<MmapMut>),
}

/// Maps the whole image once; reads and writes are memcpys against the
/// mapping. Writes take the lock because `MmapMut` hands out one `&mut [u8]`.
pub struct MmapStore {
    map: Map,
    len: u64,
}

impl MmapStore {
    /// Map a non-empty regular file. The caller keeps the image length fixed
    /// for the life of the store; resizing a mapped file is undefined.
    pub fn new(file: &File, len: u64, readonly: bool) -> io::Result<Self> {
        // SAFETY: the mapping covers a regular file this process opened and
        // whose length never changes while the store exists.
        let map = if readonly {
            Map::Ro(unsafe { MmapOptions::new().map(file)? })
        } else {
            Map::Rw(RwLock::new(unsafe { MmapOptions::new().map_mut(file)? }))
        };
        Ok(Self { map, len })
    }

    fn span(&self, offset: u64, len: usize) -> io::Result<(usize, usize)> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.len => Ok((offset as usize, end as usize)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range {offset}+{len} outside image of {} bytes", self.len),
            )),
        }
    }
}

#[async_trait]
impl BackingStore for MmapStore {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let (start, end) = self.span(offset, len)?;
        match &self.map {
            Map::Ro(map) => Ok(map[start..end].to_vec()),
            Map::Rw(map) => {
                let guard = map.read().map_err(|_| poisoned())?;
                Ok(guard[start..end].to_vec())
            }
        }
    }

    async fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        let (start, end) = self.span(offset, data.len())?;
        match &self.map {
            Map::Ro(_) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "image mapped read-only",
            )),
            Map::Rw(map) => {
                let mut guard = map.write().map_err(|_| poisoned())?;
                guard[start..end].copy_from_slice(data);
                Ok(())
            }
        }
    }

    async fn sync(&self, _datasync: bool) -> io::Result<()> {
        match &self.map {
            Map::Ro(_) => Ok(()),
            Map::Rw(map) => {
                let guard = map.read().map_err(|_| poisoned())?;
                guard.flush()
            }
        }
    }
}

fn poisoned() -> io::Error {
    io::Error::other("mmap lock poisoned")
}

//! Byte-addressable access to the opened image.
//!
//! Two access strategies sit behind one trait: a memory map for regular
//! files and positioned read/write for block devices (and for zero-length
//! images, which cannot be mapped). Selection happens once, at open time.

mod file;
mod mmap;

use std::fs::File;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use async_trait::async_trait;

use crate::config::ImageStat;
use crate::error::ConfigError;

pub use file::FileStore;
pub use mmap::MmapStore;

/// Positioned access to the image. Offsets are absolute and every call is
/// self-contained, so concurrent access to disjoint ranges needs no outside
/// locking. Short transfers surface as errors; nothing here retries.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Total image size in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes at `offset`.
    async fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Write all of `data` at `offset`.
    async fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Flush written chunk contents down to the device.
    async fn sync(&self, datasync: bool) -> io::Result<()>;
}

/// An opened image: the selected store plus the stat snapshot every
/// synthesized attribute inherits from.
pub struct OpenedImage {
    pub store: Box<dyn BackingStore>,
    pub size: u64,
    pub stat: ImageStat,
}

/// Open the image and pick an access strategy. Anything that is neither a
/// regular file nor a block device is fatal, as is a failed size discovery.
pub fn open_image(path: &Path, readonly: bool) -> Result<OpenedImage, ConfigError> {
    let display = path.display().to_string();
    let open_err = |source| ConfigError::OpenImage {
        path: display.clone(),
        source,
    };

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(!readonly)
        .open(path)
        .map_err(open_err)?;
    let md = file.metadata().map_err(open_err)?;
    let stat = ImageStat::from_metadata(&md);
    let ftype = md.file_type();

    if ftype.is_file() {
        let size = md.len();
        // An empty file has nothing to map; FileStore handles it (the chunk
        // tree is empty anyway).
        let store: Box<dyn BackingStore> = if size == 0 {
            Box::new(FileStore::new(file, size))
        } else {
            Box::new(MmapStore::new(&file, size, readonly).map_err(open_err)?)
        };
        return Ok(OpenedImage { store, size, stat });
    }

    if ftype.is_block_device() {
        // fstat reports zero for block devices; ask the kernel directly.
        let size = block_device_size(&file).map_err(|source| ConfigError::SizeDiscovery {
            path: display.clone(),
            source,
        })?;
        return Ok(OpenedImage {
            store: Box::new(FileStore::new(file, size)),
            size,
            stat,
        });
    }

    Err(ConfigError::UnsupportedImage { path: display })
}

#[cfg(target_os = "linux")]
fn block_device_size(file: &File) -> io::Result<u64> {
    use std::os::fd::AsRawFd;

    // BLKGETSIZE64 = _IOR(0x12, 114, u64)
    nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);

    let mut size: u64 = 0;
    // SAFETY: the fd is an open block device and the kernel writes one u64
    // through the pointer.
    unsafe { blkgetsize64(file.as_raw_fd(), &mut size) }
        .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;
    Ok(size)
}

#[cfg(not(target_os = "linux"))]
fn block_device_size(_file: &File) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "block device images are only supported on Linux",
    ))
}

//! Core chunk filesystem: resolution, synthesized attributes, directory
//! listings and boundary-checked chunk I/O over the opened image.

pub mod attr;
pub mod dir;

use std::path::Path;
use std::sync::LazyLock;

use bytes::Bytes;
use tracing::debug;

use crate::addr::{ChunkNode, NodeKind};
use crate::config::{ImageConfig, ImageStat};
use crate::error::{ConfigError, FsError, PathHint};
use crate::store::{self, BackingStore};

pub use attr::{FileKind, NodeAttr};
pub use dir::DirEntry;

/// Granularity of the zero-fill pass in [`ChunkFs::truncate`]. Windows that
/// already read back as zero are not rewritten, so holes in a sparse image
/// stay holes.
const ZERO_WINDOW: usize = 64 * 1024;

static ZEROS: LazyLock<Bytes> = LazyLock::new(|| Bytes::from(vec![0u8; ZERO_WINDOW]));

/// The mounted image: fixed geometry, the stat snapshot attributes inherit
/// from, and the store chunk I/O goes through. No other state exists; every
/// request is answered from these three.
pub struct ChunkFs {
    config: ImageConfig,
    stat: ImageStat,
    store: Box<dyn BackingStore>,
}

impl ChunkFs {
    /// Open `image` and validate the geometry against it.
    pub fn open(image: &Path, chunk_size: u64, readonly: bool) -> Result<Self, ConfigError> {
        let opened = store::open_image(image, readonly)?;
        let config = ImageConfig::new(chunk_size, opened.size, readonly)?;
        debug!(
            chunk_size = config.chunk_size,
            image_size = config.image_size,
            chunks = config.chunk_count,
            readonly = config.readonly,
            "opened image"
        );
        Ok(Self {
            config,
            stat: opened.stat,
            store: opened.store,
        })
    }

    /// Assemble a filesystem over an already-opened store.
    pub fn new(config: ImageConfig, stat: ImageStat, store: Box<dyn BackingStore>) -> Self {
        Self {
            config,
            stat,
            store,
        }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    pub fn image_stat(&self) -> &ImageStat {
        &self.stat
    }

    /// Resolve an absolute path to a node.
    pub fn resolve(&self, path: &str) -> Result<ChunkNode, FsError> {
        ChunkNode::parse(path, &self.config)
    }

    /// Synthesized attributes of `node`.
    pub fn attr(&self, node: ChunkNode) -> NodeAttr {
        attr::synthesize(node, &self.config, &self.stat)
    }

    /// List a directory, `.` and `..` first. The parent of the root is the
    /// root itself.
    pub fn read_dir(&self, node: ChunkNode) -> Result<Vec<DirEntry>, FsError> {
        if node.kind() != NodeKind::Directory {
            return Err(FsError::NotADirectory {
                path: PathHint::some(node.path()),
            });
        }
        let children = dir::list_children(node, &self.config);
        let mut entries = Vec::with_capacity(children.len() + 2);
        entries.push(DirEntry {
            name: ".".to_string(),
            node,
        });
        entries.push(DirEntry {
            name: "..".to_string(),
            node: node.parent().unwrap_or_else(ChunkNode::root),
        });
        entries.extend(children);
        Ok(entries)
    }

    /// Read up to `len` bytes of a chunk at `offset` (chunk-relative).
    /// Reads are clamped to the chunk's logical size; at or past it the
    /// result is empty, never an error.
    pub async fn read(&self, node: ChunkNode, offset: u64, len: usize) -> Result<Vec<u8>, FsError> {
        let logical = self.chunk_logical_size(node)?;
        if offset >= logical {
            return Ok(Vec::new());
        }
        let len = len.min((logical - offset) as usize);
        if len == 0 {
            return Ok(Vec::new());
        }
        let data = self
            .store
            .read_at(node.byte_offset(&self.config) + offset, len)
            .await?;
        Ok(data)
    }

    /// Write `data` into a chunk at `offset` (chunk-relative). A write that
    /// would cross the chunk's logical end is rejected whole; no prefix is
    /// written.
    pub async fn write(&self, node: ChunkNode, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        let logical = self.chunk_logical_size(node)?;
        if self.config.readonly {
            return Err(FsError::ReadOnly);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::FileTooBig {
                requested: u64::MAX,
                logical_size: logical,
            })?;
        if end > logical {
            return Err(FsError::FileTooBig {
                requested: end,
                logical_size: logical,
            });
        }
        if data.is_empty() {
            return Ok(0);
        }
        self.store
            .write_at(node.byte_offset(&self.config) + offset, data)
            .await?;
        Ok(data.len())
    }

    /// Shrink-only truncate: zero the chunk from `new_size` to its logical
    /// end. The reported size never changes (it is pure geometry); growing
    /// past the logical end is rejected like an overlong write. The tail is
    /// zeroed window by window, skipping windows that are already zero.
    pub async fn truncate(&self, node: ChunkNode, new_size: u64) -> Result<(), FsError> {
        let logical = self.chunk_logical_size(node)?;
        if self.config.readonly {
            return Err(FsError::ReadOnly);
        }
        if new_size > logical {
            return Err(FsError::FileTooBig {
                requested: new_size,
                logical_size: logical,
            });
        }
        let base = node.byte_offset(&self.config);
        let mut pos = new_size;
        let mut zeroed = 0u64;
        while pos < logical {
            let window = ((logical - pos) as usize).min(ZERO_WINDOW);
            let current = self.store.read_at(base + pos, window).await?;
            if current.iter().any(|&b| b != 0) {
                self.store.write_at(base + pos, &ZEROS[..window]).await?;
                zeroed += 1;
            }
            pos += window as u64;
        }
        debug!(
            index = node.index(),
            new_size, zeroed, "truncated chunk tail"
        );
        Ok(())
    }

    /// Flush written chunk contents down to the image.
    pub async fn sync(&self, datasync: bool) -> Result<(), FsError> {
        self.store.sync(datasync).await?;
        Ok(())
    }

    fn chunk_logical_size(&self, node: ChunkNode) -> Result<u64, FsError> {
        if node.kind() != NodeKind::Chunk {
            return Err(FsError::IsADirectory {
                path: PathHint::some(node.path()),
            });
        }
        Ok(node.logical_size(&self.config))
    }
}

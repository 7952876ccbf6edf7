//! FUSE adapter: translates kernel requests into chunk operations.
//!
//! The tree is structurally frozen, so every namespace mutation (create,
//! unlink, rename, chmod, ...) is rejected with `EPERM` before touching the
//! core. Inodes encode the node they name, which keeps the adapter stateless:
//! handles are always 0 and `forget` has nothing to release.

pub mod mount;

use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, ReplyAttr, ReplyCreated, ReplyData, ReplyDirectory,
    ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs, ReplyWrite, ReplyXAttr,
};
use rfuse3::raw::{Filesystem, Request};
use rfuse3::{Errno, FileType, Result as FuseResult, SetAttr, Timestamp};
use tracing::debug;

use crate::addr::{ChunkNode, NodeKind};
use crate::error::FsError;
use crate::fs::ChunkFs;
use crate::fs::attr::{FileKind, NodeAttr};

/// Entry/attribute cache TTL handed to the kernel. Attributes never change
/// while mounted, so this is purely a revalidation interval.
const TTL: Duration = Duration::from_secs(1);

impl ChunkFs {
    /// Decode a FUSE inode, rejecting anything the encoder never issued.
    fn node_of(&self, ino: u64) -> Result<ChunkNode, Errno> {
        ChunkNode::from_ino(ino, self.config()).ok_or_else(|| Errno::from(libc::ENOENT))
    }
}

impl Filesystem for ChunkFs {
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        let cfg = self.config();
        debug!(
            chunks = cfg.chunk_count,
            readonly = cfg.readonly,
            "fuse.init"
        );
        // Cap a single write at 1 MiB; larger requests arrive split.
        let max_write = NonZeroU32::new(1024 * 1024).unwrap();
        Ok(ReplyInit { max_write })
    }

    async fn destroy(&self, _req: Request) {}

    async fn lookup(&self, _req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        let parent = self.node_of(parent)?;
        if parent.kind() != NodeKind::Directory {
            return Err(libc::ENOTDIR.into());
        }
        let name = name.to_string_lossy();
        let Some(child) = parent.lookup(&name) else {
            return Err(libc::ENOENT.into());
        };
        if !child.in_range(self.config()) {
            return Err(libc::ENOENT.into());
        }
        Ok(ReplyEntry {
            ttl: TTL,
            attr: node_to_fuse_attr(&self.attr(child)),
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        let node = self.node_of(ino)?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: node_to_fuse_attr(&self.attr(node)),
        })
    }

    /// Only `size` is settable (shrink-only truncate); mode, ownership and
    /// timestamps are inherited from the image and frozen.
    async fn setattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        set_attr: SetAttr,
    ) -> FuseResult<ReplyAttr> {
        let node = self.node_of(ino)?;
        if set_attr.mode.is_some()
            || set_attr.uid.is_some()
            || set_attr.gid.is_some()
            || set_attr.atime.is_some()
            || set_attr.mtime.is_some()
            || set_attr.ctime.is_some()
        {
            return Err(libc::EPERM.into());
        }
        if let Some(size) = set_attr.size {
            debug!(ino, size, "fuse.setattr size");
            self.truncate(node, size).await.map_err(Errno::from)?;
        }
        Ok(ReplyAttr {
            ttl: TTL,
            attr: node_to_fuse_attr(&self.attr(node)),
        })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> FuseResult<ReplyOpen> {
        let node = self.node_of(ino)?;
        if node.kind() == NodeKind::Directory {
            return Err(libc::EISDIR.into());
        }
        let accmode = flags & libc::O_ACCMODE as u32;
        if self.config().readonly && accmode != libc::O_RDONLY as u32 {
            return Err(libc::EROFS.into());
        }
        // Stateless IO: no handle to allocate.
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        let node = self.node_of(ino)?;
        if node.kind() != NodeKind::Directory {
            return Err(libc::ENOTDIR.into());
        }
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        debug!(ino, offset, size, "fuse.read");
        let node = self.node_of(ino)?;
        let data = self
            .read(node, offset, size as usize)
            .await
            .map_err(Errno::from)?;
        Ok(ReplyData {
            data: Bytes::from(data),
        })
    }

    async fn write(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> FuseResult<ReplyWrite> {
        debug!(ino, offset, len = data.len(), "fuse.write");
        let node = self.node_of(ino)?;
        let written = self.write(node, offset, data).await.map_err(Errno::from)? as u32;
        Ok(ReplyWrite { written })
    }

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let node = self.node_of(ino)?;
        let entries = self.read_dir(node).map_err(Errno::from)?;

        // `.` and `..` come from the core at positions 0 and 1; the kernel
        // resumes after the offset of the last entry it saw.
        let all: Vec<DirectoryEntry> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| DirectoryEntry {
                inode: e.node.ino(),
                kind: fuse_kind(e.node.kind()),
                name: OsString::from(e.name.clone()),
                offset: (i as i64) + 1,
            })
            .collect();

        let start = if offset <= 0 { 0 } else { offset as usize };
        let slice = if start >= all.len() {
            Vec::new()
        } else {
            all[start..].to_vec()
        };
        let stream_iter = stream::iter(slice.into_iter().map(Ok));
        let boxed: Self::DirEntryStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        let node = self.node_of(ino)?;
        let entries = self.read_dir(node).map_err(Errno::from)?;

        let all: Vec<DirectoryEntryPlus> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| DirectoryEntryPlus {
                inode: e.node.ino(),
                generation: 0,
                kind: fuse_kind(e.node.kind()),
                name: OsString::from(e.name.clone()),
                offset: (i as i64) + 1,
                attr: node_to_fuse_attr(&self.attr(e.node)),
                entry_ttl: TTL,
                attr_ttl: TTL,
            })
            .collect();

        let start = if offset == 0 { 0 } else { offset as usize };
        let slice = if start >= all.len() {
            Vec::new()
        } else {
            all[start..].to_vec()
        };
        let stream_iter = stream::iter(slice.into_iter().map(Ok));
        let boxed: Self::DirEntryPlusStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        let cfg = self.config();
        Ok(ReplyStatFs {
            blocks: cfg.image_size.div_ceil(4096),
            bfree: 0,
            bavail: 0,
            files: cfg.chunk_count,
            ffree: 0,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        })
    }

    // ===== Structural mutations: the tree is frozen. =====

    async fn mknod(
        &self,
        _req: Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _rdev: u32,
    ) -> FuseResult<ReplyEntry> {
        Err(libc::EPERM.into())
    }

    async fn mkdir(
        &self,
        _req: Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
    ) -> FuseResult<ReplyEntry> {
        Err(libc::EPERM.into())
    }

    async fn unlink(&self, _req: Request, _parent: u64, _name: &OsStr) -> FuseResult<()> {
        Err(libc::EPERM.into())
    }

    async fn rmdir(&self, _req: Request, _parent: u64, _name: &OsStr) -> FuseResult<()> {
        Err(libc::EPERM.into())
    }

    async fn symlink(
        &self,
        _req: Request,
        _parent: u64,
        _name: &OsStr,
        _link: &OsStr,
    ) -> FuseResult<ReplyEntry> {
        Err(libc::EPERM.into())
    }

    async fn rename(
        &self,
        _req: Request,
        _parent: u64,
        _name: &OsStr,
        _new_parent: u64,
        _new_name: &OsStr,
    ) -> FuseResult<()> {
        Err(libc::EPERM.into())
    }

    async fn link(
        &self,
        _req: Request,
        _inode: u64,
        _new_parent: u64,
        _new_name: &OsStr,
    ) -> FuseResult<ReplyEntry> {
        Err(libc::EPERM.into())
    }

    async fn create(
        &self,
        _req: Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _flags: u32,
    ) -> FuseResult<ReplyCreated> {
        Err(libc::EPERM.into())
    }

    async fn setxattr(
        &self,
        _req: Request,
        _inode: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: u32,
        _position: u32,
    ) -> FuseResult<()> {
        Err(libc::EPERM.into())
    }

    async fn removexattr(&self, _req: Request, _inode: u64, _name: &OsStr) -> FuseResult<()> {
        Err(libc::EPERM.into())
    }

    // ===== Extended attributes are never present. =====

    async fn getxattr(
        &self,
        _req: Request,
        inode: u64,
        _name: &OsStr,
        _size: u32,
    ) -> FuseResult<ReplyXAttr> {
        self.node_of(inode)?;
        Err(libc::ENODATA.into())
    }

    async fn listxattr(&self, _req: Request, inode: u64, size: u32) -> FuseResult<ReplyXAttr> {
        self.node_of(inode)?;
        if size == 0 {
            return Ok(ReplyXAttr::Size(0));
        }
        Ok(ReplyXAttr::Data(Bytes::new()))
    }

    // ===== Stateless IO: nothing to release, nothing buffered above the
    // store. fsync pushes written chunks to the device. =====

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn flush(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _lock_owner: u64,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn fsync(&self, _req: Request, inode: u64, _fh: u64, datasync: bool) -> FuseResult<()> {
        debug!(ino = inode, datasync, "fuse.fsync");
        self.node_of(inode)?;
        self.sync(datasync).await.map_err(Errno::from)
    }

    async fn releasedir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn fsyncdir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _datasync: bool,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn access(&self, req: Request, ino: u64, mask: u32) -> FuseResult<()> {
        let node = self.node_of(ino)?;
        let attr = self.attr(node);

        // F_OK just checks existence.
        if mask == 0 {
            return Ok(());
        }
        if (mask & libc::W_OK as u32) != 0 && self.config().readonly {
            return Err(libc::EROFS.into());
        }

        // Root can access everything that has the bit set anywhere.
        if req.uid == 0 {
            if (mask & libc::X_OK as u32) != 0 && (attr.perm & 0o111) == 0 {
                return Err(libc::EACCES.into());
            }
            return Ok(());
        }

        let mode = if req.uid == attr.uid {
            (attr.perm >> 6) & 0o7
        } else if req.gid == attr.gid {
            (attr.perm >> 3) & 0o7
        } else {
            attr.perm & 0o7
        };
        if (mask & libc::R_OK as u32) != 0 && (mode & 0o4) == 0 {
            return Err(libc::EACCES.into());
        }
        if (mask & libc::W_OK as u32) != 0 && (mode & 0o2) == 0 {
            return Err(libc::EACCES.into());
        }
        if (mask & libc::X_OK as u32) != 0 && (mode & 0o1) == 0 {
            return Err(libc::EACCES.into());
        }
        Ok(())
    }

    // Inodes are pure arithmetic; there is no reference count to drop.
    async fn forget(&self, _req: Request, _inode: u64, _nlookup: u64) {}

    async fn batch_forget(&self, _req: Request, _inodes: &[(u64, u64)]) {}

    async fn interrupt(&self, _req: Request, _unique: u64) -> FuseResult<()> {
        Ok(())
    }
}

// =============== helpers ===============

impl From<FsError> for Errno {
    fn from(val: FsError) -> Self {
        let code = match val {
            FsError::NotFound { .. } => libc::ENOENT,
            FsError::NotADirectory { .. } => libc::ENOTDIR,
            FsError::IsADirectory { .. } => libc::EISDIR,
            FsError::ReadOnly => libc::EROFS,
            FsError::FileTooBig { .. } => libc::EFBIG,
            FsError::PermissionDenied { .. } => libc::EPERM,
            FsError::Io(_) => libc::EIO,
        };
        code.into()
    }
}

fn fuse_kind(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::Chunk => FileType::RegularFile,
    }
}

fn node_to_fuse_attr(attr: &NodeAttr) -> rfuse3::raw::reply::FileAttr {
    let atime = nanos_to_timestamp(attr.atime);
    let mtime = nanos_to_timestamp(attr.mtime);
    let ctime = nanos_to_timestamp(attr.ctime);
    rfuse3::raw::reply::FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks,
        atime,
        mtime,
        ctime,
        #[cfg(target_os = "macos")]
        crtime: ctime,
        kind: match attr.kind {
            FileKind::Directory => FileType::Directory,
            FileKind::Regular => FileType::RegularFile,
        },
        perm: attr.perm as u16,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: 4096,
    }
}

const NANOS_PER_SEC: i64 = 1_000_000_000;

fn nanos_to_timestamp(value: i64) -> Timestamp {
    let sec = value.div_euclid(NANOS_PER_SEC);
    let nsec = value.rem_euclid(NANOS_PER_SEC) as u32;
    Timestamp::new(sec, nsec)
}

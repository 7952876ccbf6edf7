//! Attribute synthesis for the frozen tree.
//!
//! Nothing here is stored: every node derives its attributes from the image
//! geometry and from the stat snapshot taken when the image was opened.
//! Ownership and timestamps are the image file's own; permission bits are
//! reshaped per node kind.

use crate::addr::{ChunkNode, DIR_DEPTH, NodeKind};
use crate::config::{ImageConfig, ImageStat};

/// Block size the kernel sees, and the unit `blocks` rounds up to before
/// conversion to 512-byte sectors.
pub const ATTR_BLOCK_SIZE: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
}

/// Synthesized attributes of one node, FUSE-agnostic.
#[derive(Debug, Clone, Copy)]
pub struct NodeAttr {
    pub ino: u64,
    pub kind: FileKind,
    /// Permission bits only; the file-type bits live in `kind`.
    pub perm: u32,
    pub nlink: u32,
    pub size: u64,
    /// 512-byte sectors, rounded up to whole 4 KiB blocks.
    pub blocks: u64,
    pub uid: u32,
    pub gid: u32,
    /// Unix nanoseconds, straight from the image snapshot.
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// Derive the attributes of `node`.
///
/// Directories get an exec bit per class exactly where the image grants read,
/// so a readable image yields a traversable tree. Chunk files never get exec
/// bits. Directory link counts are the POSIX `subdirs + 2`, which collapses
/// to exactly 2 at the deepest directory level where all children are files.
pub fn synthesize(node: ChunkNode, cfg: &ImageConfig, stat: &ImageStat) -> NodeAttr {
    let base = stat.mode & !0o111;
    let (kind, perm, nlink, size) = match node.kind() {
        NodeKind::Directory => {
            let perm = base | ((base & 0o444) >> 2);
            let nlink = if node.level() < DIR_DEPTH - 1 {
                node.entry_count(cfg) as u32 + 2
            } else {
                2
            };
            (FileKind::Directory, perm, nlink, 0)
        }
        NodeKind::Chunk => (FileKind::Regular, base, 1, node.logical_size(cfg)),
    };
    NodeAttr {
        ino: node.ino(),
        kind,
        perm,
        nlink,
        size,
        blocks: size.div_ceil(ATTR_BLOCK_SIZE) * (ATTR_BLOCK_SIZE / 512),
        uid: stat.uid,
        gid: stat.gid,
        atime: stat.atime,
        mtime: stat.mtime,
        ctime: stat.ctime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(chunk_size: u64, image_size: u64) -> ImageConfig {
        ImageConfig::new(chunk_size, image_size, false).unwrap()
    }

    fn stat(mode: u32) -> ImageStat {
        ImageStat {
            uid: 1000,
            gid: 1000,
            mode,
            atime: 11,
            mtime: 22,
            ctime: 33,
        }
    }

    fn node(path: &str, cfg: &ImageConfig) -> ChunkNode {
        ChunkNode::parse(path, cfg).unwrap()
    }

    #[test]
    fn directories_get_exec_where_image_grants_read() {
        let cfg = cfg(1 << 20, 3_000_000);

        let attr = synthesize(ChunkNode::root(), &cfg, &stat(0o644));
        assert_eq!(attr.kind, FileKind::Directory);
        assert_eq!(attr.perm, 0o755);

        let attr = synthesize(ChunkNode::root(), &cfg, &stat(0o600));
        assert_eq!(attr.perm, 0o700);

        // Pre-existing exec bits on the image do not leak through.
        let attr = synthesize(ChunkNode::root(), &cfg, &stat(0o751));
        assert_eq!(attr.perm, 0o750);

        let attr = synthesize(ChunkNode::root(), &cfg, &stat(0o040));
        assert_eq!(attr.perm, 0o050);
    }

    #[test]
    fn chunks_never_carry_exec_bits() {
        let cfg = cfg(1 << 20, 3_000_000);
        let leaf = node("/00/00/00", &cfg);

        let attr = synthesize(leaf, &cfg, &stat(0o755));
        assert_eq!(attr.kind, FileKind::Regular);
        assert_eq!(attr.perm, 0o644);
        assert_eq!(attr.nlink, 1);
    }

    #[test]
    fn directory_sizes_are_zero_and_link_counts_follow_children() {
        // 3 * 65536 chunks: the root lists exactly three first-level dirs.
        let cfg = cfg(4096, 4096 * 3 * 65536);
        let st = stat(0o644);

        let root = synthesize(ChunkNode::root(), &cfg, &st);
        assert_eq!(root.size, 0);
        assert_eq!(root.blocks, 0);
        assert_eq!(root.nlink, 3 + 2);

        // The deepest directory level links to no subdirectories.
        let deep = synthesize(node("/00/00", &cfg), &cfg, &st);
        assert_eq!(deep.nlink, 2);

        // A directory past the image end has no children.
        let cfg = self::cfg(1 << 20, 3_000_000);
        let empty = synthesize(node("/01", &cfg), &cfg, &st);
        assert_eq!(empty.nlink, 2);
    }

    #[test]
    fn chunk_size_and_blocks_track_the_logical_size() {
        let cfg = cfg(1 << 20, 3_000_000);
        let st = stat(0o644);

        let full = synthesize(node("/00/00/00", &cfg), &cfg, &st);
        assert_eq!(full.size, 1 << 20);
        assert_eq!(full.blocks, (1 << 20) / 4096 * 8);

        // The short last chunk rounds its tail up to a whole 4 KiB block.
        let last = synthesize(node("/00/00/02", &cfg), &cfg, &st);
        assert_eq!(last.size, 3_000_000 - (2 << 20));
        assert_eq!(last.blocks, last.size.div_ceil(4096) * 8);
    }

    #[test]
    fn snapshot_fields_pass_through() {
        let cfg = cfg(1 << 20, 3_000_000);
        let attr = synthesize(node("/00", &cfg), &cfg, &stat(0o644));
        assert_eq!((attr.uid, attr.gid), (1000, 1000));
        assert_eq!((attr.atime, attr.mtime, attr.ctime), (11, 22, 33));
    }
}

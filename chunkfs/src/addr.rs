//! Path and inode addressing for the chunk namespace.
//!
//! A chunk index is 24 bits wide, one byte per directory level: `/ab/cd/ef`
//! names chunk `0xabcdef`. Partial paths name directories whose index keeps
//! the undetermined low bytes at zero, so `/ab` spans chunks
//! `0xab0000..=0xabffff`. Everything here is pure arithmetic over the
//! immutable [`ImageConfig`]; no state survives a request.

use crate::config::ImageConfig;
use crate::error::{FsError, PathHint};

/// Number of path levels; each level contributes one byte of the index.
pub const DIR_DEPTH: u32 = 3;

/// Inode of the filesystem root.
pub const ROOT_INO: u64 = 1;

/// Fan-out of every directory level.
const FANOUT: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    Chunk,
}

/// A resolved position in the namespace: the root, an intermediate hex
/// directory, or a leaf chunk file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkNode {
    /// 0 = root, `DIR_DEPTH` = leaf chunk.
    level: u32,
    /// 24-bit chunk index, low bytes zero below `level`.
    index: u64,
}

impl ChunkNode {
    pub fn root() -> Self {
        Self { level: 0, index: 0 }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn kind(&self) -> NodeKind {
        if self.level == DIR_DEPTH {
            NodeKind::Chunk
        } else {
            NodeKind::Directory
        }
    }

    /// Parse an absolute path. Anything but `/` followed by one to three
    /// two-digit lowercase hex segments is NotFound; a full path must also
    /// name a chunk the image actually has. Partial paths are valid
    /// directories regardless of range (their listings are just empty).
    pub fn parse(path: &str, cfg: &ImageConfig) -> Result<Self, FsError> {
        let not_found = || FsError::NotFound {
            path: PathHint::some(path),
        };
        let rest = path.strip_prefix('/').ok_or_else(not_found)?;
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let mut node = Self::root();
        for seg in rest.split('/') {
            let byte = parse_segment(seg).ok_or_else(not_found)?;
            node = node.child(byte).ok_or_else(not_found)?;
        }
        if node.in_range(cfg) {
            Ok(node)
        } else {
            Err(not_found())
        }
    }

    /// Child of this directory carrying one more index byte. None at leaf
    /// depth.
    pub fn child(&self, byte: u8) -> Option<Self> {
        if self.level >= DIR_DEPTH {
            return None;
        }
        let level = self.level + 1;
        let shift = 8 * (DIR_DEPTH - level);
        Some(Self {
            level,
            index: self.index | (u64::from(byte) << shift),
        })
    }

    /// Child named by a directory-entry string (`"00"`..`"ff"`).
    pub fn lookup(&self, name: &str) -> Option<Self> {
        parse_segment(name).and_then(|byte| self.child(byte))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.level == 0 {
            return None;
        }
        let shift = 8 * (DIR_DEPTH - self.level);
        Some(Self {
            level: self.level - 1,
            index: self.index & !(0xff << shift),
        })
    }

    /// Full paths must address a chunk that exists; directories are valid
    /// whatever their range.
    pub fn in_range(&self, cfg: &ImageConfig) -> bool {
        self.kind() == NodeKind::Directory || self.index < cfg.chunk_count
    }

    /// Canonical path, `/` for the root.
    pub fn path(&self) -> String {
        if self.level == 0 {
            return "/".to_string();
        }
        let mut out = String::with_capacity(3 * self.level as usize);
        for level in 1..=self.level {
            let shift = 8 * (DIR_DEPTH - level);
            out.push_str(&format!("/{:02x}", (self.index >> shift) & 0xff));
        }
        out
    }

    /// Path of a would-be child, for error messages.
    pub fn child_path(&self, name: &str) -> String {
        if self.level == 0 {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.path())
        }
    }

    /// How many chunks each child of this directory spans. One for the
    /// deepest directory level, 256^2 for the root.
    pub fn chunks_per_entry(&self) -> u64 {
        debug_assert!(self.level < DIR_DEPTH);
        1 << (8 * (DIR_DEPTH - self.level - 1))
    }

    /// Number of children this directory exposes (0..=256).
    pub fn entry_count(&self, cfg: &ImageConfig) -> u64 {
        let per = self.chunks_per_entry();
        cfg.chunk_count
            .saturating_sub(self.index)
            .div_ceil(per)
            .min(FANOUT)
    }

    /// First byte of this node's span in the image.
    pub fn byte_offset(&self, cfg: &ImageConfig) -> u64 {
        self.index * cfg.chunk_size
    }

    /// Bytes of the image actually covered by this chunk; the last chunk is
    /// usually short, and out-of-range indexes cover nothing.
    pub fn logical_size(&self, cfg: &ImageConfig) -> u64 {
        cfg.image_size
            .saturating_sub(self.byte_offset(cfg))
            .min(cfg.chunk_size)
    }

    /// Pack the node into a FUSE inode: the root is [`ROOT_INO`]; other nodes
    /// carry the level tag above the 24-bit index.
    pub fn ino(&self) -> u64 {
        if self.level == 0 {
            ROOT_INO
        } else {
            (u64::from(self.level) << 24) | self.index
        }
    }

    /// Recover a node from an inode, rejecting values the encoder never
    /// issues: bad level tags, prefix bytes set below the level, leaves past
    /// the end of the image.
    pub fn from_ino(ino: u64, cfg: &ImageConfig) -> Option<Self> {
        if ino == ROOT_INO {
            return Some(Self::root());
        }
        let level = (ino >> 24) as u32;
        if !(1..=DIR_DEPTH).contains(&level) {
            return None;
        }
        let index = ino & 0x00ff_ffff;
        let below = 8 * (DIR_DEPTH - level);
        if below > 0 && index & ((1 << below) - 1) != 0 {
            return None;
        }
        let node = Self { level, index };
        node.in_range(cfg).then_some(node)
    }
}

/// One path segment: exactly two lowercase hex digits.
fn parse_segment(seg: &str) -> Option<u8> {
    match seg.as_bytes() {
        [hi, lo] => Some(hex_val(*hi)? << 4 | hex_val(*lo)?),
        _ => None,
    }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

//! Directory enumeration over the synthetic namespace.

use crate::addr::{ChunkNode, NodeKind};
use crate::config::ImageConfig;

/// One directory entry: the two-digit hex name and the node it leads to.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub node: ChunkNode,
}

/// Children of `dir`, in index order: `00`, `01`, ... up to the last entry
/// that still covers a chunk of the image, never more than 256. Directories
/// whose span lies past the image end list nothing.
pub fn list_children(dir: ChunkNode, cfg: &ImageConfig) -> Vec<DirEntry> {
    debug_assert_eq!(dir.kind(), NodeKind::Directory);
    (0..dir.entry_count(cfg))
        .filter_map(|byte| {
            let node = dir.child(byte as u8)?;
            Some(DirEntry {
                name: format!("{byte:02x}"),
                node,
            })
        })
        .collect()
}

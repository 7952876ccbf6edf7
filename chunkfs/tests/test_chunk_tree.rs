//! Namespace and attribute behavior over an opened image.

mod common;

use common::*;

use std::os::unix::fs::{MetadataExt, PermissionsExt};

use chunkfs::fs::FileKind;
use chunkfs::{ChunkFs, FsError, NodeKind};

const IMAGE: usize = 3_000_000;

#[test]
fn hex_paths_resolve_to_chunk_spans() {
    let (_dir, fs) = open_fs(&patterned(IMAGE), CHUNK, false);
    assert_eq!(fs.config().chunk_count, 3);

    let last = fs.resolve("/00/00/02").unwrap();
    assert_eq!(last.index(), 2);
    assert_eq!(last.kind(), NodeKind::Chunk);
    assert_eq!(last.byte_offset(fs.config()), 2 << 20);
    assert_eq!(fs.attr(last).size, (IMAGE as u64) - (2 << 20));

    // One chunk past the end, malformed digits, uppercase, too deep: absent.
    for path in ["/00/00/03", "/0g", "/AB", "/00/00/02/00"] {
        assert!(
            matches!(fs.resolve(path), Err(FsError::NotFound { .. })),
            "{path} should not resolve"
        );
    }
}

#[test]
fn partial_paths_are_directories_even_past_the_end() {
    let (_dir, fs) = open_fs(&patterned(IMAGE), CHUNK, false);

    let dir = fs.resolve("/01").unwrap();
    assert_eq!(dir.kind(), NodeKind::Directory);
    let attr = fs.attr(dir);
    assert_eq!(attr.kind, FileKind::Directory);
    assert_eq!(attr.size, 0);
    assert_eq!(attr.nlink, 2);

    // Only the dot entries remain.
    let entries = fs.read_dir(dir).unwrap();
    assert_eq!(entries.len(), 2);

    assert!(fs.resolve("/ff/ff").is_ok());
}

#[test]
fn directory_link_counts_follow_their_children() {
    // Three full first-level subtrees: 3 * 65536 chunks of 4 KiB.
    let (_dir, path) = sparse_image(4096 * 3 * 65536);
    let fs = ChunkFs::open(&path, 4096, false).unwrap();

    let root = fs.resolve("/").unwrap();
    assert_eq!(fs.attr(root).nlink, 3 + 2);
    assert_eq!(fs.read_dir(root).unwrap().len(), 3 + 2);

    // A full mid-level directory holds 256 subdirectories.
    let mid = fs.resolve("/00").unwrap();
    assert_eq!(fs.attr(mid).nlink, 256 + 2);

    // The deepest directories hold only files.
    let deep = fs.resolve("/00/00").unwrap();
    assert_eq!(fs.attr(deep).nlink, 2);
    assert_eq!(fs.read_dir(deep).unwrap().len(), 256 + 2);
}

#[test]
fn listings_cap_at_256_entries_and_pad_names() {
    // 300 chunks: the first deep directory is full, the second holds 44.
    let (_dir, fs) = open_fs(&patterned(4096 * 300), 4096, false);

    let first = fs.resolve("/00/00").unwrap();
    let entries = fs.read_dir(first).unwrap();
    assert_eq!(entries.len(), 256 + 2);
    assert_eq!(entries[2].name, "00");
    assert_eq!(entries[12].name, "0a");
    assert_eq!(entries[257].name, "ff");

    let second = fs.resolve("/00/01").unwrap();
    let entries = fs.read_dir(second).unwrap();
    assert_eq!(entries.len(), 44 + 2);
    assert_eq!(entries.last().unwrap().name, "2b");
}

#[test]
fn attributes_inherit_from_the_image_file() {
    let (_dir, path) = write_image(&patterned(8192 + 100));
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o640);
    std::fs::set_permissions(&path, perms).unwrap();

    let fs = ChunkFs::open(&path, 4096, false).unwrap();
    let md = std::fs::metadata(&path).unwrap();

    // Directories: exec exactly where the image grants read.
    let root = fs.attr(fs.resolve("/").unwrap());
    assert_eq!(root.perm, 0o750);
    assert_eq!(root.size, 0);
    assert_eq!(root.blocks, 0);
    assert_eq!(root.uid, md.uid());
    assert_eq!(root.gid, md.gid());

    // Chunks: image permissions with exec stripped, one link each.
    let leaf = fs.attr(fs.resolve("/00/00/00").unwrap());
    assert_eq!(leaf.perm, 0o640);
    assert_eq!(leaf.nlink, 1);
    assert_eq!(leaf.size, 4096);
    assert_eq!(leaf.blocks, 8);

    // The 100-byte tail chunk still occupies one 4 KiB block.
    let tail = fs.attr(fs.resolve("/00/00/02").unwrap());
    assert_eq!(tail.size, 100);
    assert_eq!(tail.blocks, 8);
}

#[test]
fn empty_image_mounts_as_an_empty_tree() {
    let (_dir, fs) = open_fs(&[], CHUNK, false);
    assert_eq!(fs.config().chunk_count, 0);

    let root = fs.resolve("/").unwrap();
    assert_eq!(fs.read_dir(root).unwrap().len(), 2);
    assert_eq!(fs.attr(root).nlink, 2);

    assert!(matches!(
        fs.resolve("/00/00/00"),
        Err(FsError::NotFound { .. })
    ));
    assert!(fs.resolve("/00").is_ok());
}

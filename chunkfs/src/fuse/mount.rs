//! Mount helpers for starting/stopping FUSE.
//!
//! Only supported on Unix-like systems. On Linux the mount goes through
//! fusermount3, so no privileges beyond /dev/fuse access are needed.

use std::path::Path;

use rfuse3::MountOptions;

use crate::fs::ChunkFs;

/// Default mount options for a chunkfs mount.
#[cfg(target_os = "linux")]
fn default_mount_options() -> MountOptions {
    let mut mo = MountOptions::default();
    mo.fs_name("chunkfs");
    // No allow_other; the mount point must be an empty directory.
    mo
}

/// Mount the filesystem on `mount_point` using unprivileged mode.
#[cfg(target_os = "linux")]
pub async fn mount_chunkfs_unprivileged(
    fs: ChunkFs,
    mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    let opts = default_mount_options();
    let session = rfuse3::raw::Session::new(opts);
    session.mount_with_unprivileged(fs, mount_point).await
}

/// Fallback stub for non-Linux targets.
#[cfg(not(target_os = "linux"))]
pub async fn mount_chunkfs_unprivileged(
    _fs: ChunkFs,
    _mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}

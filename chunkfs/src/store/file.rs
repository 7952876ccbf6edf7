//! Positioned-I/O store: block devices, plus images mmap cannot serve.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use async_trait::async_trait;

use super::BackingStore;

/// `pread`/`pwrite` access to the image. The blocking syscalls run on the
/// tokio blocking pool so FUSE worker tasks stay responsive.
pub struct FileStore {
    file: Arc<File>,
    len: u64,
}

impl FileStore {
    pub fn new(file: File, len: u64) -> Self {
        Self {
            file: Arc::new(file),
            len,
        }
    }
}

#[async_trait]
impl BackingStore for FileStore {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            let n = file.read_at(&mut buf, offset)?;
            if n != len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("short read: {n} of {len} bytes at offset {offset}"),
                ));
            }
            Ok(buf)
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        let buf = data.to_vec();
        tokio::task::spawn_blocking(move || {
            let n = file.write_at(&buf, offset)?;
            if n != buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {n} of {} bytes at offset {offset}", buf.len()),
                ));
            }
            Ok(())
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn sync(&self, datasync: bool) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            if datasync {
                file.sync_data()
            } else {
                file.sync_all()
            }
        })
        .await
        .map_err(io::Error::other)?
    }
}

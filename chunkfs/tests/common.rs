use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use chunkfs::store::{self, BackingStore};
use chunkfs::{ChunkFs, ImageConfig};

pub const CHUNK: u64 = 1 << 20;

/// Image bytes with no long zero runs, different in every chunk.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 | 1).collect()
}

/// Write `contents` to a fresh image file.
pub fn write_image(contents: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents).unwrap();
    f.sync_all().unwrap();
    (dir, path)
}

/// A sparse image of the given size, for geometry-only tests.
#[allow(dead_code)]
pub fn sparse_image(len: u64) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image");
    let f = std::fs::File::create(&path).unwrap();
    f.set_len(len).unwrap();
    f.sync_all().unwrap();
    (dir, path)
}

#[allow(dead_code)]
pub fn open_fs(contents: &[u8], chunk_size: u64, readonly: bool) -> (TempDir, ChunkFs) {
    let (dir, path) = write_image(contents);
    let fs = ChunkFs::open(&path, chunk_size, readonly).unwrap();
    (dir, fs)
}

/// Store wrapper counting the writes that reach the image.
#[allow(dead_code)]
pub struct CountingStore {
    inner: Box<dyn BackingStore>,
    writes: Arc<AtomicUsize>,
}

#[async_trait]
impl BackingStore for CountingStore {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    async fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        self.inner.read_at(offset, len).await
    }

    async fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_at(offset, data).await
    }

    async fn sync(&self, datasync: bool) -> std::io::Result<()> {
        self.inner.sync(datasync).await
    }
}

/// A filesystem whose store counts every write it performs.
#[allow(dead_code)]
pub fn counting_fs(contents: &[u8], chunk_size: u64) -> (TempDir, ChunkFs, Arc<AtomicUsize>) {
    let (dir, path) = write_image(contents);
    let opened = store::open_image(&path, false).unwrap();
    let config = ImageConfig::new(chunk_size, opened.size, false).unwrap();
    let writes = Arc::new(AtomicUsize::new(0));
    let counting = CountingStore {
        inner: opened.store,
        writes: writes.clone(),
    };
    let fs = ChunkFs::new(config, opened.stat, Box::new(counting));
    (dir, fs, writes)
}

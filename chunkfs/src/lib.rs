//! chunkfs exposes the fixed-size chunks of a disk image (regular file or
//! block device) as a synthetic directory tree: `/ab/cd/ef` is chunk
//! `0xabcdef`, one hex byte per path level. The tree is structurally frozen;
//! only chunk contents can be written.

pub mod addr;
pub mod config;
pub mod error;
pub mod fs;
pub mod fuse;
pub mod store;

// re-export selected public API
pub use addr::{ChunkNode, NodeKind};
pub use config::{DEFAULT_CHUNK_SIZE, ImageConfig, ImageStat};
pub use error::{ConfigError, FsError};
pub use fs::ChunkFs;
pub use store::BackingStore;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use chunkfs::ChunkFs;
use chunkfs::config::{CHUNK_ALIGN, DEFAULT_CHUNK_SIZE};
use chunkfs::fuse::mount::mount_chunkfs_unprivileged;

#[derive(Parser)]
#[command(name = "chunkfs", version)]
#[command(about = "Mount a disk image as a tree of fixed-size chunk files")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mount an image via FUSE.
    Mount(MountArgs),
}

#[derive(Args)]
struct MountArgs {
    /// Image to expose: a regular file or a block device.
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Directory to mount the chunk tree on.
    #[arg(value_name = "MOUNT_POINT")]
    mount_point: PathBuf,

    /// Chunk size in bytes; must be a multiple of 4096.
    #[arg(short = 'z', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Reject every write to chunk contents.
    #[arg(long)]
    read_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "chunkfs=info".to_string()))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Mount(args) => mount_cmd(args).await?,
    }

    Ok(())
}

async fn mount_cmd(args: MountArgs) -> anyhow::Result<()> {
    if args.chunk_size < CHUNK_ALIGN || args.chunk_size % CHUNK_ALIGN != 0 {
        anyhow::bail!(
            "chunk size {} is invalid: must be a multiple of {CHUNK_ALIGN}, at least {CHUNK_ALIGN}",
            args.chunk_size
        );
    }
    if !args.mount_point.is_dir() {
        anyhow::bail!("mount point must be an existing directory");
    }

    let fs = ChunkFs::open(&args.image, args.chunk_size, args.read_only)?;
    let cfg = *fs.config();
    let handle = mount_chunkfs_unprivileged(fs, &args.mount_point).await?;

    println!(
        "mounted {} at {} ({} chunks of {} bytes{})",
        args.image.display(),
        args.mount_point.display(),
        cfg.chunk_count,
        cfg.chunk_size,
        if cfg.readonly { ", read-only" } else { "" }
    );
    tokio::signal::ctrl_c().await?;
    println!("unmounting...");
    handle.unmount().await?;
    Ok(())
}

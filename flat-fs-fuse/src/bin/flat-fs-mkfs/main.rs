mod cli;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use block_dev::BlockDevice;
use clap::Parser;
use cli::{Cli, Command};
use flat_fs::{BLOCK_SIZE, DEFAULT_INODE_COUNT, Inode, SuperBlock};
use flat_fs_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Format {
            image,
            blocks,
            inodes,
        } => format(&image, blocks, inodes),
        Command::Inspect { image } => inspect(&image),
    }
}

fn format(image: &Path, blocks: u32, inodes: u32) -> io::Result<()> {
    println!("image={image:?}\nblocks={blocks}, inodes={inodes}");

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    fd.set_len(blocks as u64 * BLOCK_SIZE as u64)?;

    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd));
    // 全零的镜像必然按默认 inode 个数格式化
    let mut super_block = SuperBlock::new(block_dev, blocks).map_err(io::Error::other)?;
    if inodes != DEFAULT_INODE_COUNT {
        super_block.format(inodes).map_err(io::Error::other)?;
    }

    log::info!("{super_block:?}");
    println!("data blocks start at {}", super_block.data_start());

    Ok(())
}

fn inspect(image: &Path) -> io::Result<()> {
    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(File::open(image)?));
    let super_block = SuperBlock::load(block_dev).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "not a flat-fs image")
    })?;

    println!(
        "total blocks: {}\ntotal inodes: {}\ninode blocks: {}\nfree list head: {:?}",
        super_block.total_blocks(),
        super_block.total_inodes(),
        super_block.inode_blocks(),
        super_block.free_list(),
    );
    println!("free blocks: {}", super_block.free_blocks().count());

    let inodes = super_block.inode_table();
    let fresh = Inode::new();
    for inumber in 0..super_block.total_inodes() as u16 {
        let inode = inodes.read(inumber).map_err(io::Error::other)?;
        if inode != fresh {
            println!("inode {inumber}: {inode:?}");
        }
    }

    Ok(())
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use flat_fs::DEFAULT_INODE_COUNT;

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create (or truncate) an image and format it
    Format {
        /// Image file
        #[arg(long, short)]
        image: PathBuf,

        /// Total blocks of the image
        #[arg(long, short)]
        blocks: u32,

        /// Number of inodes
        #[arg(long, short = 'n', default_value_t = DEFAULT_INODE_COUNT)]
        inodes: u32,
    },

    /// Print the superblock, free blocks and used inodes of an image
    Inspect {
        /// Image file
        #[arg(long, short)]
        image: PathBuf,
    },
}

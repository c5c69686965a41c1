#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

/* flat-fs 的整体架构，自上而下 */

// 打开文件表：登记打开的文件，协调对 inode 的并发访问
mod file_table;

// 目录层：扁平的 文件名 <-> inode 编号 映射
mod directory;

// 共享 inode 表：所有 inode 读-改-写的唯一串行化点
mod inode_table;

// 索引节点层：文件的块映射
mod inode;

// 超级块：磁盘布局与空闲链表
mod superblock;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块读写层：整块读出、按类型查看、整块写回
mod block;

mod error;

#[cfg(test)]
mod ram_disk;

pub use self::{
    directory::{Directory, ROOT_NAME},
    error::{Error, Result},
    file_table::{FileTable, FileTableEntry, OpenFlag},
    inode::{Inode, MAX_INODES},
    inode_table::{InodeTable, Inodes},
    layout::{DIRECT_COUNT, INDIRECT_COUNT, MAX_CHARS},
    superblock::{DEFAULT_INODE_COUNT, FreeBlocks, SuperBlock},
};

pub const BLOCK_SIZE: usize = 512;
/// 每条 inode 记录的字节数
pub const INODE_SIZE: usize = 32;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

type DataBlock = [u8; BLOCK_SIZE];

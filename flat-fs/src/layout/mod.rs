//! # 磁盘数据结构层
//!
//! flat-fs 的磁盘布局：
//! 超级块 | inode 区域 | 数据块区域（空闲块串成单链表）
//!
//! 所有整数均按**大端序**存储，记录类型全部按字节对齐，
//! 可以直接在块缓冲区的任意偏移上查看。

mod super_block;
pub use super_block::{DiskSuperBlock, FreeNode, NO_BLOCK};

mod inode;
pub use inode::{DIRECT_COUNT, DiskInode, INDIRECT_COUNT, IndexBlock, decode_ptr, encode_ptr};

/// 目录快照中的文件名槽位
mod dir_entry;
pub use dir_entry::{DirName, MAX_CHARS};

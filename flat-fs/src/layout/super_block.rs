use zerocopy::big_endian::I32;
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// 空闲链表结束、或超级块中链表为空时的哨兵值
pub const NO_BLOCK: i32 = -1;

/// 超级块，位于 0 号块开头：
/// - 磁盘总块数；
/// - inode 总数，决定 inode 区域的大小；
/// - 空闲链表头
#[derive(Debug, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct DiskSuperBlock {
    pub total_blocks: I32,
    pub total_inodes: I32,
    pub free_list: I32,
}

/// 空闲块的开头 4 字节记录下一个空闲块
#[derive(Debug, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct FreeNode {
    pub next: I32,
}

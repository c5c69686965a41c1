//! inode 记录与索引块
//!
//! - 直接索引：记录本身保存文件前 [`DIRECT_COUNT`] 块的编号
//! - 间接索引：索引块连续存储 16 位**块编号**，每个编号都指向一个数据块
//!
//! 块编号为 -1 表示该槽位未使用。0 号块是超级块，不会被登记，
//! 因此格式化后全零的记录同样读作未使用。

use zerocopy::big_endian::{I16, I32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::BLOCK_SIZE;

/// 直接索引可编号数量
pub const DIRECT_COUNT: usize = 11;
/// 索引块的编号容量
pub const INDIRECT_COUNT: usize = BLOCK_SIZE / 2;

/// 间接索引块
pub type IndexBlock = [I16; INDIRECT_COUNT];

/// 32 字节的 inode 记录，每块 16 条
#[derive(Debug, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct DiskInode {
    /// 文件字节数
    pub length: I32,
    /// 打开文件表中引用它的表项个数
    pub count: I16,
    pub flag: I16,
    pub direct: [I16; DIRECT_COUNT],
    /// 指向索引块
    pub indirect: I16,
}

#[inline]
pub fn decode_ptr(ptr: I16) -> Option<u16> {
    u16::try_from(ptr.get()).ok().filter(|&block| block != 0)
}

/// 调用者保证编号不超过 `i16::MAX`
#[inline]
pub fn encode_ptr(block: Option<u16>) -> I16 {
    I16::new(block.map_or(-1, |block| block as i16))
}

//! # 索引节点层
//!
//! 内存中的 inode：文件大小、引用计数、标志以及文件的块映射。
//!
//! 文件的第 `i` 块（逻辑索引）：
//! - `i < DIRECT_COUNT` 时由直接索引记录；
//! - 否则记录在索引块的第 `i - DIRECT_COUNT` 项。
//!
//! 修改 inode 的操作都应在共享 inode 表的锁内完成，见 [`crate::InodeTable`]。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use zerocopy::big_endian::I16;

use crate::block::Block;
use crate::layout::{DIRECT_COUNT, DiskInode, INDIRECT_COUNT, IndexBlock, decode_ptr, encode_ptr};
use crate::{BLOCK_SIZE, INODE_SIZE, INODES_PER_BLOCK};
use crate::{Error, Result, SuperBlock};

/// inode 编号的上限：目录与块指针都以 16 位有符号数记录
pub const MAX_INODES: u32 = 1 << 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    /// 文件字节数
    pub length: u32,
    /// 打开文件表中引用它的表项个数
    pub count: u16,
    pub flag: u16,
    direct: [Option<u16>; DIRECT_COUNT],
    /// 索引块
    indirect: Option<u16>,
}

impl Default for Inode {
    fn default() -> Self {
        Self::new()
    }
}

impl Inode {
    /// 新文件的 inode：长度为零，所有块指针均未使用
    #[inline]
    pub fn new() -> Self {
        Self {
            length: 0,
            count: 0,
            flag: 0,
            direct: [None; DIRECT_COUNT],
            indirect: None,
        }
    }

    /// 从磁盘读出编号为 `inumber` 的 inode。
    /// 编号的范围由 [`crate::InodeTable`] 检查，外部经由它访问。
    pub(crate) fn load(inumber: u16, block_device: &Arc<dyn BlockDevice>) -> Self {
        let (block_id, offset) = disk_inode_pos(inumber);
        Block::read(block_id, block_device).map(offset, |disk_inode: &DiskInode| Self {
            length: disk_inode.length.get() as u32,
            count: disk_inode.count.get() as u16,
            flag: disk_inode.flag.get() as u16,
            direct: disk_inode.direct.map(decode_ptr),
            indirect: decode_ptr(disk_inode.indirect),
        })
    }

    /// 读出所在块，覆写自己的 32 字节记录后整块写回
    pub(crate) fn to_disk(&self, inumber: u16, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        if u32::from(inumber) >= MAX_INODES {
            log::warn!("inode {inumber} out of range, not written");
            return Err(Error::InodeOutOfRange);
        }

        let (block_id, offset) = disk_inode_pos(inumber);
        let mut block = Block::read(block_id, block_device);
        block.map_mut(offset, |disk_inode: &mut DiskInode| {
            disk_inode.length.set(self.length as i32);
            disk_inode.count.set(self.count as i16);
            disk_inode.flag.set(self.flag as i16);
            disk_inode.direct = self.direct.map(encode_ptr);
            disk_inode.indirect = encode_ptr(self.indirect);
        });
        block.write(block_device);

        Ok(())
    }

    /// 把文件内的字节偏移转换为物理块编号；尚未分配时返回空
    pub fn find_target_block(
        &self,
        offset: u32,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Option<u32> {
        let block_index = offset as usize / BLOCK_SIZE;

        if block_index < DIRECT_COUNT {
            return self.direct[block_index].map(u32::from);
        }

        let indirect = self.indirect?;
        // 剔去直接索引的部分
        let slot = block_index - DIRECT_COUNT;
        if slot >= INDIRECT_COUNT {
            return None;
        }

        Block::read(indirect.into(), block_device)
            .map(0, |index_block: &IndexBlock| decode_ptr(index_block[slot]))
            .map(u32::from)
    }

    /// 登记索引块，并在磁盘上把它初始化为全部未使用
    pub fn register_index_block(
        &mut self,
        index_block: u32,
        super_block: &SuperBlock,
    ) -> Result<()> {
        if self.indirect.is_some() {
            return Err(Error::IndexBlockExists);
        }
        let index_block = data_ptr(super_block, index_block)?;

        let mut block = Block::zeroed(index_block.into());
        block.map_mut(0, |index_block: &mut IndexBlock| index_block.fill(I16::new(-1)));
        block.write(super_block.block_device());

        self.indirect = Some(index_block);
        Ok(())
    }

    /// 把 `block_id` 登记为偏移 `offset` 所在的块。
    ///
    /// 直接索引必须连续填充；落在间接范围且还没有索引块时，
    /// 先从超级块申请一块作为索引块。
    pub fn register_target_block(
        &mut self,
        super_block: &mut SuperBlock,
        offset: u32,
        block_id: u32,
    ) -> Result<()> {
        let target = data_ptr(super_block, block_id)?;
        let block_index = offset as usize / BLOCK_SIZE;

        if block_index < DIRECT_COUNT {
            if self.direct[block_index].is_some() {
                return Err(Error::SlotOccupied);
            }
            if block_index > 0 && self.direct[block_index - 1].is_none() {
                return Err(Error::NonContiguous);
            }
            self.direct[block_index] = Some(target);
            return Ok(());
        }

        let slot = block_index - DIRECT_COUNT;
        if slot >= INDIRECT_COUNT {
            return Err(Error::OffsetOutOfRange);
        }

        let block_device = super_block.block_device().clone();
        let indirect = match self.indirect {
            Some(indirect) => indirect,
            None => {
                let index_block = super_block.get_free_block().ok_or(Error::NoFreeBlock)?;
                if let Err(err) = self.register_index_block(index_block, super_block) {
                    // 刚弹出的块，原样归还不会失败
                    let _ = super_block.return_block(index_block);
                    return Err(err);
                }
                log::debug!("registered index block {index_block}");
                index_block as u16
            }
        };

        let mut block = Block::read(indirect.into(), &block_device);
        let occupied = block.map_mut(0, |index_block: &mut IndexBlock| {
            if decode_ptr(index_block[slot]).is_some() {
                return true;
            }
            index_block[slot] = encode_ptr(Some(target));
            false
        });
        if occupied {
            return Err(Error::SlotOccupied);
        }
        block.write(&block_device);

        Ok(())
    }

    /// 注销索引块，返回其中登记过的数据块，由调用者逐个归还。
    /// 索引块本身的编号需要调用者事先通过 [`Inode::index_block_number`] 取得。
    pub fn unregister_index_block(
        &mut self,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Option<Vec<u32>> {
        let indirect = self.indirect?;
        let targets =
            Block::read(indirect.into(), block_device).map(0, |index_block: &IndexBlock| {
                index_block
                    .iter()
                    .filter_map(|&ptr| decode_ptr(ptr))
                    .map(u32::from)
                    .collect()
            });
        self.indirect = None;

        Some(targets)
    }

    #[inline]
    pub fn index_block_number(&self) -> Option<u32> {
        self.indirect.map(u32::from)
    }

    /// 直接索引的第 `index` 项
    #[inline]
    pub fn direct(&self, index: usize) -> Option<u32> {
        self.direct.get(index).copied().flatten().map(u32::from)
    }

    /// 卸下文件引用的所有块（数据块与索引块），长度归零；
    /// 返回的块由调用者交还给超级块。
    pub fn release_blocks(&mut self, block_device: &Arc<dyn BlockDevice>) -> Vec<u32> {
        let mut blocks: Vec<u32> = self
            .direct
            .iter_mut()
            .filter_map(Option::take)
            .map(u32::from)
            .collect();

        if let Some(indirect) = self.index_block_number() {
            if let Some(targets) = self.unregister_index_block(block_device) {
                blocks.extend(targets);
            }
            blocks.push(indirect);
        }

        self.length = 0;
        blocks
    }
}

/// 通过编号获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**
#[inline]
fn disk_inode_pos(inumber: u16) -> (u32, usize) {
    let inumber = inumber as usize;
    let block_id = (inumber / INODES_PER_BLOCK + 1) as u32;
    let offset = inumber % INODES_PER_BLOCK * INODE_SIZE;

    (block_id, offset)
}

/// 只有数据区域内、且能以非负 16 位指针记录的块才能登记
fn data_ptr(super_block: &SuperBlock, block_id: u32) -> Result<u16> {
    if block_id < super_block.data_start() {
        return Err(Error::ReservedBlock);
    }
    if block_id >= super_block.total_blocks() {
        return Err(Error::BlockOutOfRange);
    }
    i16::try_from(block_id)
        .map(|ptr| ptr as u16)
        .map_err(|_| Error::BlockOutOfRange)
}

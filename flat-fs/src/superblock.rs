//! # 超级块
//!
//! 超级块记录磁盘布局，并管理数据块的分配与回收。
//!
//! 空闲数据块串成单链表：每个空闲块开头 4 字节存放下一个空闲块的编号，
//! 最后一块存放 -1。分配时弹出链表头，回收时压入链表头。

use alloc::collections::BTreeSet;
use alloc::sync::Arc;
use core::fmt;

use block_dev::BlockDevice;

use crate::INODES_PER_BLOCK;
use crate::InodeTable;
use crate::MAX_INODES;
use crate::block::Block;
use crate::layout::{DiskSuperBlock, FreeNode, NO_BLOCK};
use crate::{Error, Result};

/// 磁盘内容无效时，默认格式化出的 inode 个数
pub const DEFAULT_INODE_COUNT: u32 = 32;

pub struct SuperBlock {
    block_device: Arc<dyn BlockDevice>,
    /// 磁盘总块数
    total_blocks: u32,
    total_inodes: u32,
    /// 空闲链表头
    free_list: Option<u32>,
}

impl SuperBlock {
    /// 读取 0 号块；若其记录与磁盘大小相符且看起来合法则沿用，
    /// 否则以默认 inode 个数格式化整个磁盘。
    pub fn new(block_device: Arc<dyn BlockDevice>, disk_size: u32) -> Result<Self> {
        if let Some(super_block) =
            Self::load(block_device.clone()).filter(|sb| sb.total_blocks == disk_size)
        {
            log::info!(
                "mounted: {} blocks, {} inodes, free list head {:?}",
                super_block.total_blocks,
                super_block.total_inodes,
                super_block.free_list
            );
            return Ok(super_block);
        }

        let mut super_block = Self {
            block_device,
            total_blocks: disk_size,
            total_inodes: 0,
            free_list: None,
        };
        super_block.format_default()?;

        Ok(super_block)
    }

    /// 只读取 0 号块，不做格式化；0 号块不是合法的超级块时返回空
    pub fn load(block_device: Arc<dyn BlockDevice>) -> Option<Self> {
        let (total_blocks, total_inodes, free_list) =
            Block::read(0, &block_device).map(0, |super_block: &DiskSuperBlock| {
                (
                    super_block.total_blocks.get(),
                    super_block.total_inodes.get(),
                    super_block.free_list.get(),
                )
            });

        let total_blocks = u32::try_from(total_blocks).ok()?;
        let total_inodes = u32::try_from(total_inodes)
            .ok()
            .filter(|&inodes| inodes > 0 && inodes <= MAX_INODES)?;
        let data_start = data_start_for(total_inodes);
        if data_start >= total_blocks {
            return None;
        }

        // 磁盘用满时链表为空，同样合法
        let free_list = match free_list {
            NO_BLOCK => None,
            head => Some(
                u32::try_from(head)
                    .ok()
                    .filter(|head| (data_start..total_blocks).contains(head))?,
            ),
        };

        Some(Self {
            block_device,
            total_blocks,
            total_inodes,
            free_list,
        })
    }

    /// 按指定 inode 个数重建磁盘布局：清空 inode 区域，
    /// 再把全部数据块串成空闲链表。
    pub fn format(&mut self, num_inodes: u32) -> Result<()> {
        if num_inodes == 0 || num_inodes > MAX_INODES {
            return Err(Error::InvalidInodeCount);
        }
        if self.total_blocks > i32::MAX as u32 {
            return Err(Error::BlockOutOfRange);
        }
        let data_start = data_start_for(num_inodes);
        if data_start >= self.total_blocks {
            return Err(Error::DiskTooSmall);
        }

        self.total_inodes = num_inodes;
        self.free_list = Some(data_start);
        self.sync();

        for block_id in 1..data_start {
            Block::zeroed(block_id).write(&self.block_device);
        }

        for block_id in data_start..self.total_blocks {
            let next = if block_id + 1 < self.total_blocks {
                (block_id + 1) as i32
            } else {
                NO_BLOCK
            };
            let mut block = Block::zeroed(block_id);
            block.map_mut(0, |node: &mut FreeNode| node.next.set(next));
            block.write(&self.block_device);
        }

        log::info!(
            "formatted: {} blocks, {} inodes, data area starts at block {}",
            self.total_blocks,
            self.total_inodes,
            data_start
        );
        Ok(())
    }

    /// 以 [`DEFAULT_INODE_COUNT`] 个 inode 格式化
    pub fn format_default(&mut self) -> Result<()> {
        log::info!("default format ({DEFAULT_INODE_COUNT} inodes)");
        self.format(DEFAULT_INODE_COUNT)
    }

    /// 把三个字段写回 0 号块
    pub fn sync(&self) {
        let mut block = Block::zeroed(0);
        block.map_mut(0, |super_block: &mut DiskSuperBlock| {
            super_block.total_blocks.set(self.total_blocks as i32);
            super_block.total_inodes.set(self.total_inodes as i32);
            super_block
                .free_list
                .set(self.free_list.map_or(NO_BLOCK, |head| head as i32));
        });
        block.write(&self.block_device);
    }

    /// 弹出空闲链表头并返回其编号，链表头随之前进到下一个空闲块。
    /// 链表为空时返回空。
    pub fn get_free_block(&mut self) -> Option<u32> {
        let head = self.free_list?;
        let next = Block::read(head, &self.block_device).map(0, |node: &FreeNode| node.next.get());

        self.free_list = match next {
            NO_BLOCK => None,
            next => {
                let next = u32::try_from(next)
                    .ok()
                    .filter(|&next| self.is_data_block(next));
                if next.is_none() {
                    log::warn!("free list broken after block {head}, dropping the rest");
                }
                next
            }
        };
        self.sync();

        log::trace!("allocated block {head}, free list head {:?}", self.free_list);
        Some(head)
    }

    /// 把块压回空闲链表头。
    ///
    /// 为了发现重复归还，每次都会沿空闲链表读一遍设备，
    /// 开销与空闲块数成正比；成批归还请用 [`SuperBlock::return_blocks`]。
    pub fn return_block(&mut self, block_id: u32) -> Result<()> {
        self.check_returnable(block_id)?;
        if self.free_blocks().any(|free| free == block_id) {
            log::warn!("block {block_id} is already free");
            return Err(Error::DoubleFree);
        }

        self.push_free(block_id);
        self.sync();

        log::trace!("returned block {block_id}");
        Ok(())
    }

    /// 成批归还，只遍历一次空闲链表。
    /// 任何一块不能归还（含批内重复）时，整批都不归还。
    pub fn return_blocks(&mut self, blocks: &[u32]) -> Result<()> {
        let mut free: BTreeSet<u32> = self.free_blocks().collect();
        for &block_id in blocks {
            self.check_returnable(block_id)?;
            if !free.insert(block_id) {
                log::warn!("block {block_id} is already free");
                return Err(Error::DoubleFree);
            }
        }

        for &block_id in blocks {
            self.push_free(block_id);
        }
        self.sync();

        log::trace!("returned {} blocks", blocks.len());
        Ok(())
    }

    /// 从链表头开始遍历空闲链表
    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            super_block: self,
            next: self.free_list,
            remaining: self.total_blocks - self.data_start(),
        }
    }

    /// 创建容量为 inode 总数的共享 inode 表
    pub fn inode_table(&self) -> InodeTable {
        InodeTable::new(self.block_device.clone(), self.total_inodes)
    }

    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    #[inline]
    pub fn total_inodes(&self) -> u32 {
        self.total_inodes
    }

    #[inline]
    pub fn free_list(&self) -> Option<u32> {
        self.free_list
    }

    /// inode 区域占据的块数
    #[inline]
    pub fn inode_blocks(&self) -> u32 {
        self.data_start() - 1
    }

    /// 第一个数据块
    #[inline]
    pub fn data_start(&self) -> u32 {
        data_start_for(self.total_inodes)
    }

    #[inline]
    pub fn block_device(&self) -> &Arc<dyn BlockDevice> {
        &self.block_device
    }

    /// 只有数据区域内的块可以归还
    fn check_returnable(&self, block_id: u32) -> Result<()> {
        if block_id < self.data_start() {
            log::warn!("refusing to free reserved block {block_id}");
            return Err(Error::ReservedBlock);
        }
        if block_id >= self.total_blocks {
            return Err(Error::BlockOutOfRange);
        }
        Ok(())
    }

    /// 写入链表节点并成为新的链表头，不写回超级块
    fn push_free(&mut self, block_id: u32) {
        let mut block = Block::zeroed(block_id);
        block.map_mut(0, |node: &mut FreeNode| {
            node.next
                .set(self.free_list.map_or(NO_BLOCK, |head| head as i32))
        });
        block.write(&self.block_device);

        self.free_list = Some(block_id);
    }

    #[inline]
    fn is_data_block(&self, block_id: u32) -> bool {
        (self.data_start()..self.total_blocks).contains(&block_id)
    }
}

impl fmt::Debug for SuperBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuperBlock")
            .field("total_blocks", &self.total_blocks)
            .field("total_inodes", &self.total_inodes)
            .field("free_list", &self.free_list)
            .finish_non_exhaustive()
    }
}

/// 空闲链表迭代器。步数以数据块总数为上限，损坏成环的链表也能结束。
pub struct FreeBlocks<'a> {
    super_block: &'a SuperBlock,
    next: Option<u32>,
    remaining: u32,
}

impl Iterator for FreeBlocks<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if self.remaining == 0 {
            log::warn!("free list does not terminate");
            self.next = None;
            return None;
        }
        self.remaining -= 1;

        let next = Block::read(current, &self.super_block.block_device)
            .map(0, |node: &FreeNode| node.next.get());
        self.next = u32::try_from(next)
            .ok()
            .filter(|&next| self.super_block.is_data_block(next));

        Some(current)
    }
}

/// 超级块占 0 号块，inode 区域紧随其后
#[inline]
fn data_start_for(num_inodes: u32) -> u32 {
    1 + num_inodes.div_ceil(INODES_PER_BLOCK as u32)
}

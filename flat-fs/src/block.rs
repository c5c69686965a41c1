//! # 块读写层
//!
//! 每次操作都直接从块设备读出整块到内存缓冲区，按磁盘数据结构查看或修改，
//! 再**显式**写回；不做任何缓存，也不会在析构时隐式写回。

use alloc::sync::Arc;
use core::mem;

use block_dev::BlockDevice;
use zerocopy::{AsBytes, FromBytes};

use crate::BLOCK_SIZE;
use crate::DataBlock;

/// 内存中的一个磁盘块
pub struct Block {
    /// 块的数据
    data: DataBlock,
    /// 对应的块ID
    block_id: usize,
}

impl Block {
    pub fn read(block_id: u32, block_device: &Arc<dyn BlockDevice>) -> Self {
        let block_id = block_id as usize;
        let mut data = [0; BLOCK_SIZE];
        block_device.read_block(block_id, &mut data);

        Self { data, block_id }
    }

    /// 不读设备，内容全零的块，用于整块覆写
    #[inline]
    pub fn zeroed(block_id: u32) -> Self {
        Self {
            data: [0; BLOCK_SIZE],
            block_id: block_id as usize,
        }
    }

    #[inline]
    pub fn write(&self, block_device: &Arc<dyn BlockDevice>) {
        block_device.write_block(self.block_id, &self.data);
    }

    pub fn get<T: FromBytes>(&self, offset: usize) -> &T {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        T::ref_from_prefix(&self.data[offset..]).expect("on-disk types are unaligned")
    }

    pub fn get_mut<T: FromBytes + AsBytes>(&mut self, offset: usize) -> &mut T {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        T::mut_from_prefix(&mut self.data[offset..]).expect("on-disk types are unaligned")
    }

    #[inline]
    pub fn map<T: FromBytes, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: FromBytes + AsBytes, V>(
        &mut self,
        offset: usize,
        f: impl FnOnce(&mut T) -> V,
    ) -> V {
        f(self.get_mut(offset))
    }
}

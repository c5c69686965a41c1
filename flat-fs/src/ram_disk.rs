//! 测试用的内存块设备

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::BLOCK_SIZE;
use crate::DataBlock;

pub struct RamDisk {
    blocks: Mutex<Vec<DataBlock>>,
}

impl RamDisk {
    pub fn new(total_blocks: usize) -> Arc<dyn BlockDevice> {
        Arc::new(Self {
            blocks: Mutex::new(vec![[0; BLOCK_SIZE]; total_blocks]),
        })
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.blocks.lock()[block_id]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        self.blocks.lock()[block_id].copy_from_slice(buf);
    }
}

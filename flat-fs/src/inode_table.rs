//! # 共享 inode 表
//!
//! 按 inode 编号缓存内存中的 [`Inode`]，同一编号始终只有一个对象。
//! 整张表由一把锁保护：对 inode 记录的读-改-写必须持有 [`Inodes`] 守卫，
//! 以免并发的调用者交错写入同一块中的记录。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use block_dev::BlockDevice;
use spin::{Mutex, MutexGuard};

use crate::{Error, Inode, Result};

pub struct InodeTable {
    block_device: Arc<dyn BlockDevice>,
    capacity: usize,
    slots: Mutex<Vec<Option<Inode>>>,
}

/// 持有 inode 表锁期间对表的访问
pub struct Inodes<'a> {
    block_device: &'a Arc<dyn BlockDevice>,
    slots: MutexGuard<'a, Vec<Option<Inode>>>,
}

impl InodeTable {
    /// 容量必须等于磁盘上的 inode 总数，见 [`crate::SuperBlock::inode_table`]
    pub(crate) fn new(block_device: Arc<dyn BlockDevice>, total_inodes: u32) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(total_inodes as usize, || None);

        Self {
            block_device,
            capacity: total_inodes as usize,
            slots: Mutex::new(slots),
        }
    }

    /// 获取整张表的独占访问
    pub fn lock(&self) -> Inodes<'_> {
        Inodes {
            block_device: &self.block_device,
            slots: self.slots.lock(),
        }
    }

    /// 读出磁盘上的 inode 记录，忽略缓存
    pub fn read(&self, inumber: u16) -> Result<Inode> {
        if inumber as usize >= self.capacity {
            return Err(Error::InodeOutOfRange);
        }
        Ok(Inode::load(inumber, &self.block_device))
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn block_device(&self) -> &Arc<dyn BlockDevice> {
        &self.block_device
    }
}

impl fmt::Debug for InodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InodeTable")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl Inodes<'_> {
    #[inline]
    pub fn get(&self, inumber: u16) -> Option<&Inode> {
        self.slots.get(inumber as usize)?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, inumber: u16) -> Option<&mut Inode> {
        self.slots.get_mut(inumber as usize)?.as_mut()
    }

    /// 取出已缓存的 inode，未缓存时从磁盘读入
    pub fn load(&mut self, inumber: u16) -> Result<&mut Inode> {
        let block_device = self.block_device;
        let slot = self
            .slots
            .get_mut(inumber as usize)
            .ok_or(Error::InodeOutOfRange)?;

        Ok(slot.get_or_insert_with(|| Inode::load(inumber, block_device)))
    }

    /// 放入 inode，替换槽位中原有的对象
    pub fn insert(&mut self, inumber: u16, inode: Inode) -> Result<&mut Inode> {
        let slot = self
            .slots
            .get_mut(inumber as usize)
            .ok_or(Error::InodeOutOfRange)?;

        Ok(slot.insert(inode))
    }

    /// 移出缓存；之后再访问该编号会重新从磁盘读入
    #[inline]
    pub fn evict(&mut self, inumber: u16) -> Option<Inode> {
        self.slots.get_mut(inumber as usize)?.take()
    }

    /// 把缓存的 inode 写回磁盘，未缓存时报告找不到
    pub fn persist(&self, inumber: u16) -> Result<()> {
        self.get(inumber)
            .ok_or(Error::NotFound)?
            .to_disk(inumber, self.block_device)
    }

    #[inline]
    pub fn block_device(&self) -> &Arc<dyn BlockDevice> {
        self.block_device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SuperBlock;
    use crate::ram_disk::RamDisk;

    fn table() -> InodeTable {
        SuperBlock::new(RamDisk::new(100), 100)
            .unwrap()
            .inode_table()
    }

    #[test]
    fn sized_by_superblock() {
        assert_eq!(table().capacity(), crate::DEFAULT_INODE_COUNT as usize);
    }

    #[test]
    fn load_hydrates_once() {
        let table = table();
        let mut fresh = Inode::new();
        fresh.length = 77;
        fresh.to_disk(5, table.block_device()).unwrap();

        let mut inodes = table.lock();
        assert!(inodes.get(5).is_none());
        inodes.load(5).unwrap().count += 1;
        // 第二次取到的是同一个缓存对象，而不是磁盘上的旧值
        assert_eq!(inodes.load(5).unwrap().count, 1);
        assert_eq!(inodes.get(5).unwrap().length, 77);
        assert_eq!(Inode::load(5, table.block_device()).count, 0);

        inodes.persist(5).unwrap();
        assert_eq!(Inode::load(5, table.block_device()).count, 1);
    }

    #[test]
    fn insert_and_evict() {
        let table = table();
        let mut inodes = table.lock();
        let mut inode = Inode::new();
        inode.flag = 9;

        inodes.insert(3, inode.clone()).unwrap();
        assert_eq!(inodes.get(3), Some(&inode));
        assert_eq!(inodes.evict(3), Some(inode));
        assert!(inodes.get(3).is_none());
        assert_eq!(inodes.persist(3), Err(Error::NotFound));
    }

    #[test]
    fn out_of_range_numbers() {
        let table = table();
        let mut inodes = table.lock();
        assert_eq!(inodes.load(32).err(), Some(Error::InodeOutOfRange));
        assert_eq!(inodes.insert(40, Inode::new()).err(), Some(Error::InodeOutOfRange));
        assert!(inodes.evict(40).is_none());
    }

    #[test]
    fn numbers_past_inode_area_never_touch_data_blocks() {
        let super_block = SuperBlock::new(RamDisk::new(1000), 1000).unwrap();
        let table = super_block.inode_table();
        let free_before = super_block.free_blocks().count();

        let mut inodes = table.lock();
        for inumber in [32, 33, 96, 32767] {
            assert_eq!(inodes.load(inumber).err(), Some(Error::InodeOutOfRange));
            assert_eq!(
                inodes.insert(inumber, Inode::new()).err(),
                Some(Error::InodeOutOfRange)
            );
            assert_eq!(inodes.persist(inumber), Err(Error::NotFound));
        }
        drop(inodes);

        assert_eq!(table.read(32).err(), Some(Error::InodeOutOfRange));
        assert_eq!(table.read(31), Ok(Inode::new()));
        assert_eq!(super_block.free_blocks().count(), free_before);
        assert_eq!(super_block.free_blocks().next(), Some(3));
    }

    #[test]
    fn read_bypasses_cache() {
        let table = table();
        let mut inodes = table.lock();
        inodes.load(4).unwrap().length = 10;
        drop(inodes);

        assert_eq!(table.read(4).unwrap().length, 0);
        table.lock().persist(4).unwrap();
        assert_eq!(table.read(4).unwrap().length, 10);
    }
}

//! # 打开文件表
//!
//! 每次打开文件都会在表中登记一个 [`FileTableEntry`]。
//! 同一 inode 的所有表项共享 [`InodeTable`] 中的同一个 inode 对象，
//! 其 `count` 即存活的表项个数。
//!
//! 加锁顺序：inode 表 → 目录 → 表项列表。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::hint;
use core::sync::atomic::{AtomicUsize, Ordering};

use enumflags2::{BitFlags, bitflags};
use spin::Mutex;

use crate::{Directory, Error, Inode, InodeTable, ROOT_NAME, Result};

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    Read = 0b001,
    Write = 0b010,
    /// 写入从文件末尾开始
    Append = 0b100,
}

impl OpenFlag {
    /// 解析打开模式：`"r"`、`"w"`、`"w+"`、`"a"`
    pub fn from_mode(mode: &str) -> Option<BitFlags<OpenFlag>> {
        let flags = match mode {
            "r" => OpenFlag::Read.into(),
            "w" => OpenFlag::Write.into(),
            "w+" => OpenFlag::Read | OpenFlag::Write,
            "a" => OpenFlag::Write | OpenFlag::Append,
            _ => return None,
        };
        Some(flags)
    }

    pub fn mode(flags: BitFlags<OpenFlag>) -> &'static str {
        if flags.contains(OpenFlag::Append) {
            "a"
        } else if flags.contains(OpenFlag::Read | OpenFlag::Write) {
            "w+"
        } else if flags.contains(OpenFlag::Write) {
            "w"
        } else {
            "r"
        }
    }
}

/// 打开的文件
#[derive(Debug)]
pub struct FileTableEntry {
    inumber: u16,
    flags: BitFlags<OpenFlag>,
    inodes: Arc<InodeTable>,
}

#[derive(Debug)]
pub struct FileTable {
    entries: Mutex<Vec<Arc<FileTableEntry>>>,
    directory: Arc<Mutex<Directory>>,
    inodes: Arc<InodeTable>,
    /// 每次成功释放表项后加一，等待表清空的线程据此重新检查
    released: AtomicUsize,
}

impl FileTable {
    pub fn new(directory: Arc<Mutex<Directory>>, inodes: Arc<InodeTable>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            directory,
            inodes,
            released: AtomicUsize::new(0),
        }
    }

    /// 打开文件并登记表项。
    ///
    /// 文件不存在时，只读模式报告找不到，其余模式在目录中新建文件。
    pub fn falloc(&self, filename: &str, mode: &str) -> Result<Arc<FileTableEntry>> {
        let flags = OpenFlag::from_mode(mode).ok_or(Error::InvalidMode)?;
        let mut inodes = self.inodes.lock();

        let found = if filename == ROOT_NAME {
            Some(0)
        } else {
            self.directory.lock().namei(filename)
        };

        let inumber = match found {
            Some(inumber) => inumber,
            None if !flags.contains(OpenFlag::Write) => return Err(Error::NotFound),
            None => {
                let mut directory = self.directory.lock();
                let inumber = directory.ialloc(filename)?;
                if let Err(err) = inodes.insert(inumber, Inode::new()) {
                    // 目录比 inode 表大时撤销刚分配的编号
                    let _ = directory.ifree(inumber);
                    return Err(err);
                }
                inumber
            }
        };

        let inode = inodes.load(inumber)?;
        // 磁盘上的 count 是 16 位有符号数
        let count = inode
            .count
            .checked_add(1)
            .filter(|&count| count <= i16::MAX as u16)
            .ok_or(Error::TooManyOpens)?;
        inode.count = count;
        inodes.persist(inumber)?;

        let entry = Arc::new(FileTableEntry {
            inumber,
            flags,
            inodes: self.inodes.clone(),
        });
        self.entries.lock().push(entry.clone());

        log::debug!("falloc {filename:?} ({mode}) -> inode {inumber}, count {count}");
        Ok(entry)
    }

    /// 释放表项并写回其 inode；返回表项是否在表中
    pub fn ffree(&self, entry: &Arc<FileTableEntry>) -> bool {
        let mut inodes = self.inodes.lock();

        let removed = {
            let mut entries = self.entries.lock();
            entries
                .iter()
                .position(|e| Arc::ptr_eq(e, entry))
                .map(|index| entries.remove(index))
        };
        if removed.is_none() {
            return false;
        }

        let inumber = entry.inumber;
        match inodes.load(inumber) {
            Ok(inode) => {
                inode.count = inode.count.saturating_sub(1);
                let count = inode.count;
                if let Err(err) = inodes.persist(inumber) {
                    log::warn!("ffree: inode {inumber} not written back: {err}");
                }
                if count == 0 {
                    inodes.evict(inumber);
                }
                log::debug!("ffree inode {inumber}, count {count}");
            }
            Err(err) => log::warn!("ffree: inode {inumber} unavailable: {err}"),
        }
        drop(inodes);

        self.released.fetch_add(1, Ordering::Release);
        true
    }

    /// 表中没有打开的文件
    pub fn fempty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// 自旋等待，直到所有表项都被释放，例如格式化之前
    pub fn wait_empty(&self) {
        loop {
            let seen = self.released.load(Ordering::Acquire);
            if self.fempty() {
                return;
            }
            while self.released.load(Ordering::Acquire) == seen {
                hint::spin_loop();
            }
        }
    }

    #[inline]
    pub fn directory(&self) -> &Arc<Mutex<Directory>> {
        &self.directory
    }

    #[inline]
    pub fn inode_table(&self) -> &Arc<InodeTable> {
        &self.inodes
    }
}

impl FileTableEntry {
    #[inline]
    pub fn inumber(&self) -> u16 {
        self.inumber
    }

    #[inline]
    pub fn flags(&self) -> BitFlags<OpenFlag> {
        self.flags
    }

    #[inline]
    pub fn mode(&self) -> &'static str {
        OpenFlag::mode(self.flags)
    }

    #[inline]
    pub fn readable(&self) -> bool {
        self.flags.contains(OpenFlag::Read)
    }

    #[inline]
    pub fn writable(&self) -> bool {
        self.flags.contains(OpenFlag::Write)
    }

    #[inline]
    pub fn appending(&self) -> bool {
        self.flags.contains(OpenFlag::Append)
    }

    /// 在 inode 表锁内读取共享的 inode
    pub fn inode<V>(&self, f: impl FnOnce(&Inode) -> V) -> Result<V> {
        let mut inodes = self.inodes.lock();
        inodes.load(self.inumber).map(|inode| f(inode))
    }

    /// 在 inode 表锁内修改共享的 inode，并立即写回磁盘
    pub fn update_inode<V>(&self, f: impl FnOnce(&mut Inode) -> V) -> Result<V> {
        let mut inodes = self.inodes.lock();
        let value = f(inodes.load(self.inumber)?);
        inodes.persist(self.inumber)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::SuperBlock;
    use crate::ram_disk::RamDisk;

    fn file_table(dir_slots: u16) -> FileTable {
        let super_block = SuperBlock::new(RamDisk::new(100), 100).unwrap();
        let inodes = Arc::new(super_block.inode_table());
        let directory = Arc::new(Mutex::new(Directory::new(dir_slots)));
        FileTable::new(directory, inodes)
    }

    fn count_on_disk(table: &FileTable, inumber: u16) -> u16 {
        Inode::load(inumber, table.inode_table().block_device()).count
    }

    #[test]
    fn modes() {
        assert_eq!(OpenFlag::from_mode("r"), Some(OpenFlag::Read.into()));
        assert_eq!(
            OpenFlag::from_mode("w+"),
            Some(OpenFlag::Read | OpenFlag::Write)
        );
        assert_eq!(OpenFlag::from_mode("rw"), None);
        for mode in ["r", "w", "w+", "a"] {
            assert_eq!(OpenFlag::mode(OpenFlag::from_mode(mode).unwrap()), mode);
        }
    }

    #[test]
    fn missing_file_for_reading() {
        let table = file_table(32);
        assert_eq!(table.falloc("nope", "r").err(), Some(Error::NotFound));
        assert_eq!(table.falloc("nope", "x").err(), Some(Error::InvalidMode));
        assert!(table.fempty());
        assert_eq!(table.directory().lock().namei("nope"), None);
    }

    #[test]
    fn root_is_inode_zero() {
        let table = file_table(32);
        let root = table.falloc(ROOT_NAME, "r").unwrap();
        assert_eq!(root.inumber(), 0);
        assert!(root.readable() && !root.writable());
        assert!(table.ffree(&root));
    }

    #[test]
    fn entries_share_one_inode() {
        let table = file_table(32);
        let writer = table.falloc("log", "a").unwrap();
        let reader = table.falloc("LOG", "r").unwrap();

        assert_eq!(writer.inumber(), 1);
        assert_eq!(reader.inumber(), 1);
        assert!(writer.appending());
        assert_eq!(table.len(), 2);
        assert_eq!(count_on_disk(&table, 1), 2);

        writer.update_inode(|inode| inode.length = 100).unwrap();
        assert_eq!(reader.inode(|inode| inode.length), Ok(100));

        assert!(table.ffree(&writer));
        assert!(!table.ffree(&writer));
        assert_eq!(count_on_disk(&table, 1), 1);
        assert_eq!(reader.inode(|inode| inode.count), Ok(1));

        assert!(table.ffree(&reader));
        assert!(table.fempty());
        assert_eq!(count_on_disk(&table, 1), 0);
        assert_eq!(Inode::load(1, table.inode_table().block_device()).length, 100);
        assert!(table.inode_table().lock().get(1).is_none());
    }

    #[test]
    fn open_count_is_bounded() {
        let table = file_table(32);
        let first = table.falloc("busy", "w").unwrap();
        first
            .update_inode(|inode| inode.count = i16::MAX as u16)
            .unwrap();

        assert_eq!(table.falloc("busy", "r").err(), Some(Error::TooManyOpens));
        assert_eq!(table.len(), 1);
        assert_eq!(count_on_disk(&table, first.inumber()), i16::MAX as u16);

        first.update_inode(|inode| inode.count = 1).unwrap();
        let second = table.falloc("busy", "r").unwrap();
        assert_eq!(count_on_disk(&table, second.inumber()), 2);
        assert!(table.ffree(&second));
        assert!(table.ffree(&first));
    }

    #[test]
    fn directory_full() {
        let table = file_table(2);
        let a = table.falloc("a", "w").unwrap();
        assert_eq!(table.falloc("b", "w").err(), Some(Error::DirectoryFull));
        assert_eq!(table.len(), 1);
        assert!(table.ffree(&a));
    }

    #[test]
    fn directory_larger_than_inode_table() {
        let table = file_table(40);
        let capacity = table.inode_table().capacity();
        let entries: Vec<_> = (1..capacity)
            .map(|i| table.falloc(&std::format!("f{i}"), "w").unwrap())
            .collect();

        assert_eq!(
            table.falloc("overflow", "w").err(),
            Some(Error::InodeOutOfRange)
        );
        assert_eq!(table.directory().lock().namei("overflow"), None);

        for entry in &entries {
            assert!(table.ffree(entry));
        }
        assert!(table.fempty());
    }

    #[test]
    fn concurrent_open_and_close() {
        let table = Arc::new(file_table(32));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let entry = table.falloc("shared", "w+").unwrap();
                        entry.update_inode(|inode| inode.length += 1).unwrap();
                        assert!(table.ffree(&entry));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert!(table.fempty());
        let inode = Inode::load(1, table.inode_table().block_device());
        assert_eq!(inode.count, 0);
        assert_eq!(inode.length, 800);
    }

    #[test]
    fn wait_empty_blocks_until_released() {
        let table = Arc::new(file_table(32));
        let entry = table.falloc("busy", "w").unwrap();

        let closer = {
            let table = table.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                assert!(table.ffree(&entry));
            })
        };
        table.wait_empty();
        assert!(table.fempty());
        closer.join().unwrap();
    }
}

//! # 目录层
//!
//! 单层的根目录 `"/"`：第 `i` 个槽位保存 inode `i` 的文件名，
//! 文件名为空即表示该 inode 编号空闲。0 号槽位固定为根目录自身。
//!
//! 整个目录可以序列化为一段字节，作为根目录文件的内容保存：
//! 先是每个槽位 4 字节的文件名长度，再是每个槽位 [`MAX_CHARS`] 个字符的文件名。

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use zerocopy::big_endian::I32;
use zerocopy::{AsBytes, FromBytes};

use crate::layout::{DirName, MAX_CHARS};
use crate::{Error, Result};

pub const ROOT_NAME: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    names: Vec<String>,
}

impl Directory {
    /// `max_inumber` 个槽位，除根目录外全部空闲
    pub fn new(max_inumber: u16) -> Self {
        let mut names = vec![String::new(); max_inumber as usize];
        if let Some(root) = names.first_mut() {
            root.push_str(ROOT_NAME);
        }

        Self { names }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.names.len()
    }

    /// 目录快照的字节数
    #[inline]
    pub fn bytes_len(&self) -> usize {
        self.capacity() * (4 + DirName::SIZE)
    }

    /// 用快照覆盖整个目录。快照不完整或长度字段越界时不做任何修改。
    pub fn load_bytes(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < self.bytes_len() {
            return Err(Error::CorruptDirectory);
        }
        let (sizes, names) = data.split_at(self.capacity() * 4);

        let names = sizes
            .chunks_exact(4)
            .zip(names.chunks_exact(DirName::SIZE))
            .map(|(size, name)| {
                let size = I32::read_from(size)
                    .and_then(|size| usize::try_from(size.get()).ok())
                    .filter(|&size| size < MAX_CHARS)
                    .ok_or(Error::CorruptDirectory)?;
                let name = DirName::read_from(name).ok_or(Error::CorruptDirectory)?;
                Ok(name.name(size))
            })
            .collect::<Result<Vec<_>>>()?;

        self.names = names;
        Ok(())
    }

    /// 把整个目录序列化为字节
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.bytes_len());

        for name in &self.names {
            let size = name.encode_utf16().count() as i32;
            data.extend_from_slice(I32::new(size).as_bytes());
        }
        for name in &self.names {
            data.extend_from_slice(DirName::new(name).as_bytes());
        }

        data
    }

    /// 为文件名分配 inode 编号，取第一个空闲槽位
    pub fn ialloc(&mut self, filename: &str) -> Result<u16> {
        let len = filename.encode_utf16().count();
        if len == 0 || len >= MAX_CHARS {
            return Err(Error::InvalidName);
        }
        if self.namei(filename).is_some() {
            return Err(Error::AlreadyExists);
        }

        let (inumber, slot) = self
            .names
            .iter_mut()
            .enumerate()
            .find(|(_, name)| name.is_empty())
            .ok_or(Error::DirectoryFull)?;
        slot.push_str(filename);

        log::debug!("ialloc {filename:?} -> inode {inumber}");
        Ok(inumber as u16)
    }

    /// 释放 inode 编号；根目录与空闲槽位不可释放
    pub fn ifree(&mut self, inumber: u16) -> Result<()> {
        if inumber == 0 {
            return Err(Error::RootInode);
        }
        let name = self
            .names
            .get_mut(inumber as usize)
            .ok_or(Error::InodeOutOfRange)?;
        if name.is_empty() {
            return Err(Error::AlreadyFree);
        }

        log::debug!("ifree inode {inumber} ({name:?})");
        name.clear();
        Ok(())
    }

    /// 按文件名（不区分大小写）查找 inode 编号
    pub fn namei(&self, filename: &str) -> Option<u16> {
        self.names
            .iter()
            .position(|name| !name.is_empty() && eq_ignore_case(name, filename))
            .map(|inumber| inumber as u16)
    }

    /// 已分配的 (inode 编号, 文件名)
    pub fn entries(&self) -> impl Iterator<Item = (u16, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(inumber, name)| (inumber as u16, name.as_str()))
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

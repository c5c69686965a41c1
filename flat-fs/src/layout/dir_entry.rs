use alloc::string::String;

use zerocopy::big_endian::U16;
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// 文件名槽位的字符数，文件名本身最长 `MAX_CHARS - 1`
pub const MAX_CHARS: usize = 30;

/// 每个字符按 UTF-16 大端存两字节，不足部分补零
#[derive(Debug, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct DirName {
    chars: [U16; MAX_CHARS],
}

impl DirName {
    /// 元信息大小恒为60字节
    pub const SIZE: usize = MAX_CHARS * 2;

    pub fn new(name: &str) -> Self {
        let mut slot = Self::new_zeroed();
        for (dst, unit) in slot.chars.iter_mut().zip(name.encode_utf16()) {
            dst.set(unit);
        }
        slot
    }

    /// 按目录记录的长度取出文件名
    pub fn name(&self, len: usize) -> String {
        char::decode_utf16(self.chars[..len].iter().map(|unit| unit.get()))
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// 失败一律以错误值返回，且不改变任何状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 文件名为空或过长
    InvalidName,
    /// 无法识别的打开模式
    InvalidMode,
    InodeOutOfRange,
    /// 根目录项不可释放
    RootInode,
    AlreadyFree,
    AlreadyExists,
    NotFound,
    DirectoryFull,
    /// 空闲链表已空
    NoFreeBlock,
    /// 超级块或 inode 区域的块
    ReservedBlock,
    /// 块编号超出磁盘，或无法以 16 位指针记录
    BlockOutOfRange,
    /// 块已在空闲链表上
    DoubleFree,
    SlotOccupied,
    /// 直接索引必须从 0 开始连续填充
    NonContiguous,
    IndexBlockExists,
    /// 偏移量超出直接索引与索引块的寻址范围
    OffsetOutOfRange,
    /// 同一 inode 的打开表项过多，计数无法以 16 位有符号数记录
    TooManyOpens,
    InvalidInodeCount,
    DiskTooSmall,
    CorruptDirectory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidName => "invalid file name",
            Self::InvalidMode => "invalid open mode",
            Self::InodeOutOfRange => "inode number out of range",
            Self::RootInode => "the root entry cannot be freed",
            Self::AlreadyFree => "inode number is already free",
            Self::AlreadyExists => "file name already exists",
            Self::NotFound => "no such file",
            Self::DirectoryFull => "directory is full",
            Self::NoFreeBlock => "no free block left",
            Self::ReservedBlock => "block belongs to the superblock or inode area",
            Self::BlockOutOfRange => "block number out of range",
            Self::DoubleFree => "block is already on the free list",
            Self::SlotOccupied => "block slot is already occupied",
            Self::NonContiguous => "direct blocks must be registered in order",
            Self::IndexBlockExists => "index block is already registered",
            Self::OffsetOutOfRange => "offset exceeds the addressable file size",
            Self::TooManyOpens => "too many open entries for one inode",
            Self::InvalidInodeCount => "invalid inode count",
            Self::DiskTooSmall => "disk too small for the requested layout",
            Self::CorruptDirectory => "malformed directory snapshot",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

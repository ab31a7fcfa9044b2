use thiserror::Error;

use crate::structs::BlockKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("block index {0} is out of range")]
    OutOfRange(usize),
    #[error("no free block left on the volume")]
    DiskFull,
    #[error("directory has no free slot")]
    DirectoryFull,
    #[error("name is too long")]
    NameTooLong,
    #[error("an entry with that name already exists")]
    DuplicateName,
    #[error("no such file or directory")]
    NoSuchPath,
    #[error("file not found")]
    FileNotFound,
    #[error("no entry with that name in the directory")]
    NoSuchName,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory is not empty")]
    DirectoryNotEmpty,
    #[error("allocation chain is broken at block {0}")]
    BrokenChain(usize),
    #[error("chain link precondition violated at block {0}")]
    InvalidChainState(usize),
    #[error("invalid entry name")]
    InvalidName,
    #[error("invalid path")]
    InvalidPath,
    #[error("path is too long")]
    PathTooLong,
    #[error("unknown open mode")]
    InvalidMode,
    #[error("operation not permitted by the channel's open mode")]
    WrongMode,
    #[error("channel is closed")]
    ChannelClosed,
    #[error("entry is in use by the current directory or an open channel")]
    Busy,
    #[error("channel no longer matches its directory entry")]
    StaleChannel,
    #[error("block {index} is a {found:?} block, expected {expected:?}")]
    BlockKindMismatch {
        index: usize,
        expected: BlockKind,
        found: BlockKind,
    },
    #[error("directory block {0} is corrupt")]
    CorruptDirectory(usize),
    #[error("image is not a valid volume")]
    InvalidImage,
    #[error("i/o error: {0}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        FsError::Io(err.kind())
    }
}

pub type Result<T> = core::result::Result<T, FsError>;

// src/error.rs
use std::io;

use libc::{EEXIST, EINVAL, EIO, EISDIR, ENAMETOOLONG, ENOENT, ENOSPC, ENOTDIR, ENOTEMPTY, EPERM, EFBIG};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no contiguous run of {blocks_needed} free blocks")]
    FsFull { blocks_needed: u32 },
    #[error("block {block} lies inside the metadata region (data starts at {data_start})")]
    ReservedAreaViolation { block: u32, data_start: u32 },
    #[error("parent directory has no free entry slot")]
    ParentFull,
    #[error("'{0}' already exists in this directory")]
    DuplicateName(String),
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("'{0}' is a file, not a directory")]
    NotADirectory(String),
    #[error("'{0}' is a directory")]
    IsADirectory(String),
    #[error("directory '{0}' is not empty")]
    NotEmpty(String),
    #[error("the root directory cannot be deleted")]
    OperationOnRootDenied,
    #[error("'.' and '..' cannot be deleted")]
    DotEntryDenied,
    #[error("consistency fault: directory at block {child} has no entry in parent at block {parent}")]
    ConsistencyFault { child: u32, parent: u32 },
    #[error("invalid name '{0}'")]
    InvalidName(String),
    #[error("{0} bytes do not fit in a single entry")]
    FileTooLarge(u64),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("corrupt superblock: {0}")]
    CorruptSuperblock(String),
    #[error("corrupt directory entry: {0}")]
    CorruptEntry(String),
    #[error("extent {start}+{length} runs past the end of the volume ({total_blocks} blocks)")]
    ExtentOutOfRange { start: u32, length: u32, total_blocks: u32 },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    pub fn as_errno(&self) -> i32 {
        match self {
            FsError::FsFull { .. } | FsError::ParentFull => ENOSPC,
            FsError::ReservedAreaViolation { .. }
            | FsError::OperationOnRootDenied
            | FsError::DotEntryDenied => EPERM,
            FsError::DuplicateName(_) => EEXIST,
            FsError::NotFound(_) => ENOENT,
            FsError::NotADirectory(_) => ENOTDIR,
            FsError::IsADirectory(_) => EISDIR,
            FsError::NotEmpty(_) => ENOTEMPTY,
            FsError::InvalidName(name) if name.len() > crate::layout::NAME_LEN => ENAMETOOLONG,
            FsError::InvalidName(_) | FsError::InvalidGeometry(_) => EINVAL,
            FsError::FileTooLarge(_) => EFBIG,
            FsError::ConsistencyFault { .. }
            | FsError::CorruptSuperblock(_)
            | FsError::CorruptEntry(_)
            | FsError::ExtentOutOfRange { .. }
            | FsError::Io(_) => EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

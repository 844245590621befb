//! SACS: a flat-image filesystem with contiguous extents.
//!
//! A volume is one image file: superblock in block 0, a free-block bitmap,
//! a fixed-size root directory, then data extents. Files and directories
//! each occupy one contiguous run of blocks chosen best-fit, and every
//! directory caches the cumulative size of its subtree in its `.` entry.

mod alloc;
mod bitvec;
mod dir;
mod error;
mod fs;
mod layout;
mod volume;
pub mod fsck;

pub use crate::alloc::{blocks_for, contiguous_alloc, contiguous_dealloc, read_bitmap, BestFit};
pub use crate::bitvec::{get_bit, set_bit, unset_bit};
pub use crate::dir::{
    add_entry_to_parent,
    check_duplicate,
    dir_size,
    find_entry,
    prepare_entry,
    update_hierarchy_size,
};
pub use crate::error::{FsError, Result};
pub use crate::fs::{SacsFilesystem, TreeEntry, ROOT_NAME};
pub use crate::layout::{
    validate_name,
    DirEntry,
    EntryKind,
    EntryStatus,
    FormatOptions,
    Superblock,
    EMPTY_DIR_SIZE,
    ENTRY_SIZE,
    NAME_LEN,
    SACS_SYSID,
    SUPERBLOCK_SIZE,
};
pub use crate::volume::Volume;

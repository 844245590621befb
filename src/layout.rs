// src/layout.rs
//! On-disk layout of a SACS volume.
//!
//! ```text
//! [ superblock | bitmap (bitmap_size) | root dir (root_size) | data blocks ... ]
//!   block 0      block 1                root_start             data_start
//! ```
//!
//! Records are encoded field by field, little-endian, at fixed offsets; the
//! in-memory structs never alias disk bytes.

use std::fmt;

use crate::error::{FsError, Result};

// -----------------------------------------------------------------------------
// Constants
// -----------------------------------------------------------------------------

/// Default volume identifier ("SACS").
pub const SACS_SYSID: u32 = 0x5341_4353;

/// Length of the superblock record, including its reserved tail.
pub const SUPERBLOCK_SIZE: usize = 64;

/// Length of one directory entry slot.
pub const ENTRY_SIZE: usize = 32;

/// Logical size of an empty directory: its `.` and `..` entries.
pub const EMPTY_DIR_SIZE: u32 = 2 * ENTRY_SIZE as u32;

/// Significant bytes of an entry name; the buffer keeps one extra NUL.
pub const NAME_LEN: usize = 16;
const NAME_BUF_LEN: usize = NAME_LEN + 1;

pub const BITMAP_START: u32 = 1;

/// Largest accepted `sector_size_exp + block_size_exp`.
pub const MAX_BLOCK_SHIFT: u16 = 24;

pub const DOT: &str = ".";
pub const DOTDOT: &str = "..";

// -------------------- Superblock --------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub sysid: u32,
    pub sector_count: u32,
    pub sector_size_exp: u16,
    pub block_size_exp: u16,
    pub root_blocks: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            sysid: SACS_SYSID,
            sector_count: 80,
            sector_size_exp: 9,
            block_size_exp: 2,
            root_blocks: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub sysid: u32,
    pub sector_size_exp: u16,
    pub block_size_exp: u16,
    pub sector_count: u32,
    pub total_blocks: u32,
    pub bitmap_start: u32,
    pub bitmap_size: u32,
    pub root_start: u32,
    pub root_size: u32,
    pub data_start: u32,
}

fn block_shift(sector_size_exp: u16, block_size_exp: u16) -> Option<u32> {
    let shift = sector_size_exp.checked_add(block_size_exp)?;
    let min_shift = SUPERBLOCK_SIZE.trailing_zeros() as u16;
    (min_shift..=MAX_BLOCK_SHIFT)
        .contains(&shift)
        .then_some(shift as u32)
}

fn bitmap_blocks(total_blocks: u32, real_block_size: u32) -> u32 {
    let bytes = (total_blocks as u64).div_ceil(8);
    (bytes.div_ceil(real_block_size as u64) as u32).max(1)
}

impl Superblock {
    /// Derives the whole volume geometry from the format parameters.
    pub fn build(opts: &FormatOptions) -> Result<Self> {
        let shift = block_shift(opts.sector_size_exp, opts.block_size_exp).ok_or_else(|| {
            FsError::InvalidGeometry(format!(
                "block size 2^({}+{}) must be between {} and 2^{} bytes",
                opts.sector_size_exp, opts.block_size_exp, SUPERBLOCK_SIZE, MAX_BLOCK_SHIFT
            ))
        })?;
        if opts.sector_count == 0 {
            return Err(FsError::InvalidGeometry("sector count must be positive".into()));
        }
        if opts.root_blocks == 0 {
            return Err(FsError::InvalidGeometry(
                "root directory needs at least one block".into(),
            ));
        }

        let real_block_size = 1u32 << shift;
        let sectors_per_block = 1u64 << opts.block_size_exp;
        let total_blocks = (opts.sector_count as u64).div_ceil(sectors_per_block) as u32;
        let bitmap_size = bitmap_blocks(total_blocks, real_block_size);
        let root_start = BITMAP_START + bitmap_size;
        let data_start = root_start as u64 + opts.root_blocks as u64;

        if data_start > total_blocks as u64 {
            return Err(FsError::InvalidGeometry(format!(
                "metadata needs {} blocks but the volume only has {}",
                data_start, total_blocks
            )));
        }

        Ok(Self {
            sysid: opts.sysid,
            sector_size_exp: opts.sector_size_exp,
            block_size_exp: opts.block_size_exp,
            sector_count: opts.sector_count,
            total_blocks,
            bitmap_start: BITMAP_START,
            bitmap_size,
            root_start,
            root_size: opts.root_blocks,
            data_start: data_start as u32,
        })
    }

    /// Checks a decoded superblock against the geometry rules it was built with.
    pub fn validate(&self) -> Result<()> {
        let corrupt = |msg: String| Err(FsError::CorruptSuperblock(msg));

        let Some(shift) = block_shift(self.sector_size_exp, self.block_size_exp) else {
            return corrupt(format!(
                "block size exponents {}+{} out of range",
                self.sector_size_exp, self.block_size_exp
            ));
        };
        let expected_total = (self.sector_count as u64).div_ceil(1u64 << self.block_size_exp);
        if self.total_blocks as u64 != expected_total {
            return corrupt(format!(
                "total_blocks = {}, but {} sectors give {}",
                self.total_blocks, self.sector_count, expected_total
            ));
        }
        if self.bitmap_start != BITMAP_START
            || self.bitmap_size != bitmap_blocks(self.total_blocks, 1 << shift)
        {
            return corrupt(format!(
                "bitmap at {}+{} does not match {} blocks",
                self.bitmap_start, self.bitmap_size, self.total_blocks
            ));
        }
        if self.root_size == 0 || self.root_start != self.bitmap_start + self.bitmap_size {
            return corrupt(format!(
                "root directory at {}+{} is misplaced",
                self.root_start, self.root_size
            ));
        }
        if self.data_start as u64 != self.root_start as u64 + self.root_size as u64
            || self.data_start > self.total_blocks
        {
            return corrupt(format!(
                "data_start = {} (root ends at {}, volume has {} blocks)",
                self.data_start,
                self.root_start as u64 + self.root_size as u64,
                self.total_blocks
            ));
        }
        Ok(())
    }

    pub fn real_block_size(&self) -> u32 {
        (1u32 << self.sector_size_exp) << self.block_size_exp
    }

    pub fn entries_per_block(&self) -> u32 {
        self.real_block_size() / ENTRY_SIZE as u32
    }

    pub fn data_blocks(&self) -> u32 {
        self.total_blocks - self.data_start
    }

    /// Size of the whole image in bytes.
    pub fn image_len(&self) -> u64 {
        self.total_blocks as u64 * self.real_block_size() as u64
    }

    pub fn encode(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        buf[0..4].copy_from_slice(&self.sysid.to_le_bytes());
        buf[4..6].copy_from_slice(&self.sector_size_exp.to_le_bytes());
        buf[6..8].copy_from_slice(&self.block_size_exp.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sector_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.total_blocks.to_le_bytes());
        buf[16..20].copy_from_slice(&self.bitmap_start.to_le_bytes());
        buf[20..24].copy_from_slice(&self.bitmap_size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.root_start.to_le_bytes());
        buf[28..32].copy_from_slice(&self.root_size.to_le_bytes());
        buf[32..36].copy_from_slice(&self.data_start.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; SUPERBLOCK_SIZE]) -> Self {
        Self {
            sysid: u32_at(buf, 0),
            sector_size_exp: u16_at(buf, 4),
            block_size_exp: u16_at(buf, 6),
            sector_count: u32_at(buf, 8),
            total_blocks: u32_at(buf, 12),
            bitmap_start: u32_at(buf, 16),
            bitmap_size: u32_at(buf, 20),
            root_start: u32_at(buf, 24),
            root_size: u32_at(buf, 28),
            data_start: u32_at(buf, 32),
        }
    }
}

impl fmt::Display for Superblock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sysid        = {:#010x}", self.sysid)?;
        writeln!(
            f,
            "Sector size  = 2^{} = {}",
            self.sector_size_exp,
            1u32 << self.sector_size_exp
        )?;
        writeln!(f, "Sector count = {}", self.sector_count)?;
        writeln!(
            f,
            "Block size   = 2^{} sectors = {} bytes",
            self.block_size_exp,
            self.real_block_size()
        )?;
        writeln!(f, "Total blocks = {}", self.total_blocks)?;
        writeln!(f, "Bitmap       = {} (+{})", self.bitmap_start, self.bitmap_size)?;
        writeln!(f, "Root         = {} (+{})", self.root_start, self.root_size)?;
        write!(f, "Data start   = {} ({} data blocks)", self.data_start, self.data_blocks())
    }
}

// -------------------- Directory entries --------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Free,
    Valid,
    Deleted,
}

impl EntryStatus {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Free),
            1 => Ok(Self::Valid),
            3 => Ok(Self::Deleted),
            other => Err(FsError::CorruptEntry(format!("unknown status {:#04x}", other))),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Valid => 1,
            Self::Deleted => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Unused,
    Dir,
    File,
}

impl EntryKind {
    fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(Self::Unused),
            0x0002 => Ok(Self::Dir),
            0x0003 => Ok(Self::File),
            other => Err(FsError::CorruptEntry(format!("unknown type {:#06x}", other))),
        }
    }

    fn to_raw(self) -> u16 {
        match self {
            Self::Unused => 0,
            Self::Dir => 0x0002,
            Self::File => 0x0003,
        }
    }
}

/// One 32-byte directory slot.
///
/// For a directory, `size` caches the cumulative byte size held in the
/// directory's own `.` entry; `length` is always the allocated extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub status: EntryStatus,
    pub name: String,
    pub kind: EntryKind,
    pub start_block: u32,
    pub size: u32,
    pub length: u32,
}

impl DirEntry {
    pub fn is_valid(&self) -> bool {
        self.status == EntryStatus::Valid
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_dot_or_dotdot(&self) -> bool {
        self.name == DOT || self.name == DOTDOT
    }

    /// Encodes the record; names longer than `NAME_LEN` bytes are cut.
    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[0] = self.status.to_byte();
        let name = self.name.as_bytes();
        let n = name.len().min(NAME_LEN);
        buf[1..1 + n].copy_from_slice(&name[..n]);
        buf[18..20].copy_from_slice(&self.kind.to_raw().to_le_bytes());
        buf[20..24].copy_from_slice(&self.start_block.to_le_bytes());
        buf[24..28].copy_from_slice(&self.size.to_le_bytes());
        buf[28..32].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; ENTRY_SIZE]) -> Result<Self> {
        let raw_name = &buf[1..1 + NAME_BUF_LEN];
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        Ok(Self {
            status: EntryStatus::from_byte(buf[0])?,
            name: String::from_utf8_lossy(&raw_name[..end.min(NAME_LEN)]).into_owned(),
            kind: EntryKind::from_raw(u16_at(buf, 18))?,
            start_block: u32_at(buf, 20),
            size: u32_at(buf, 24),
            length: u32_at(buf, 28),
        })
    }
}

/// Rejects names that cannot be stored in a slot or would break lookups.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > NAME_LEN
        || name.contains(['/', '\0'])
        || name == DOT
        || name == DOTDOT
    {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        // 80 sectors of 512 bytes, 4 sectors per block
        let sb = Superblock::build(&FormatOptions::default()).unwrap();
        assert_eq!(sb.real_block_size(), 2048);
        assert_eq!(sb.total_blocks, 20);
        assert_eq!(sb.bitmap_start, 1);
        assert_eq!(sb.bitmap_size, 1);
        assert_eq!(sb.root_start, 2);
        assert_eq!(sb.data_start, 6);
        assert_eq!(sb.data_blocks(), 14);
        assert_eq!(sb.entries_per_block(), 64);
        sb.validate().unwrap();
    }

    #[test]
    fn total_blocks_rounds_up() {
        let opts = FormatOptions {
            sector_count: 81,
            ..FormatOptions::default()
        };
        assert_eq!(Superblock::build(&opts).unwrap().total_blocks, 21);
    }

    #[test]
    fn bitmap_spans_several_blocks() {
        // 64-byte blocks hold 512 bits each
        let opts = FormatOptions {
            sector_count: 2000,
            sector_size_exp: 6,
            block_size_exp: 0,
            root_blocks: 2,
            ..FormatOptions::default()
        };
        let sb = Superblock::build(&opts).unwrap();
        assert_eq!(sb.total_blocks, 2000);
        assert_eq!(sb.bitmap_size, 4);
        assert_eq!(sb.root_start, 5);
        assert_eq!(sb.data_start, 7);
    }

    #[test]
    fn rejects_bad_geometry() {
        let tiny_block = FormatOptions {
            sector_size_exp: 4,
            block_size_exp: 1,
            ..FormatOptions::default()
        };
        assert!(matches!(
            Superblock::build(&tiny_block),
            Err(FsError::InvalidGeometry(_))
        ));

        let huge_root = FormatOptions {
            root_blocks: 19,
            ..FormatOptions::default()
        };
        assert!(matches!(
            Superblock::build(&huge_root),
            Err(FsError::InvalidGeometry(_))
        ));

        let no_root = FormatOptions {
            root_blocks: 0,
            ..FormatOptions::default()
        };
        assert!(Superblock::build(&no_root).is_err());
    }

    #[test]
    fn metadata_may_fill_the_volume() {
        let opts = FormatOptions {
            root_blocks: 18,
            ..FormatOptions::default()
        };
        let sb = Superblock::build(&opts).unwrap();
        assert_eq!(sb.data_start, sb.total_blocks);
        assert_eq!(sb.data_blocks(), 0);
    }

    #[test]
    fn superblock_codec() {
        let sb = Superblock::build(&FormatOptions::default()).unwrap();
        let bytes = sb.encode();
        assert_eq!(&bytes[0..4], &SACS_SYSID.to_le_bytes());
        assert_eq!(&bytes[36..], &[0u8; 28]);
        assert_eq!(Superblock::decode(&bytes), sb);
    }

    #[test]
    fn validate_catches_tampering() {
        let mut sb = Superblock::build(&FormatOptions::default()).unwrap();
        sb.data_start += 1;
        assert!(matches!(sb.validate(), Err(FsError::CorruptSuperblock(_))));
    }

    #[test]
    fn entry_layout() {
        let entry = DirEntry {
            status: EntryStatus::Valid,
            name: "ola.txt".into(),
            kind: EntryKind::File,
            start_block: 6,
            size: 15,
            length: 1,
        };
        let bytes = entry.encode();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..8], b"ola.txt");
        assert_eq!(bytes[8], 0);
        assert_eq!(&bytes[18..20], &[0x03, 0x00]);
        assert_eq!(&bytes[20..24], &6u32.to_le_bytes());
        assert_eq!(&bytes[24..28], &15u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &1u32.to_le_bytes());
        assert_eq!(DirEntry::decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn full_length_name_keeps_terminator() {
        let entry = DirEntry {
            status: EntryStatus::Valid,
            name: "abcdefghijklmnop".into(),
            kind: EntryKind::Dir,
            start_block: 9,
            size: EMPTY_DIR_SIZE,
            length: 1,
        };
        let bytes = entry.encode();
        assert_eq!(bytes[17], 0);
        assert_eq!(DirEntry::decode(&bytes).unwrap().name, "abcdefghijklmnop");
    }

    #[test]
    fn zeroed_slot_is_free() {
        let entry = DirEntry::decode(&[0u8; ENTRY_SIZE]).unwrap();
        assert_eq!(entry.status, EntryStatus::Free);
        assert_eq!(entry.kind, EntryKind::Unused);
        assert!(entry.name.is_empty());
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let mut bytes = [0u8; ENTRY_SIZE];
        bytes[0] = 7;
        assert!(matches!(
            DirEntry::decode(&bytes),
            Err(FsError::CorruptEntry(_))
        ));
    }

    #[test]
    fn names() {
        validate_name("ola.txt").unwrap();
        validate_name("abcdefghijklmnop").unwrap();
        for bad in ["", ".", "..", "a/b", "abcdefghijklmnopq", "nul\0"] {
            assert!(validate_name(bad).is_err(), "{bad:?} accepted");
        }
    }
}

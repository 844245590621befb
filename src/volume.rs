// src/volume.rs
//! Positioned I/O over the image file.
//!
//! Every access names its byte offset explicitly (pread/pwrite), so no
//! operation depends on, or disturbs, a shared file cursor.

use std::fs::File;
use std::os::unix::fs::FileExt;

use crate::error::Result;
use crate::layout::{DirEntry, ENTRY_SIZE, SUPERBLOCK_SIZE, Superblock};

pub struct Volume {
    file: File,
    block_size: u32,
}

impl Volume {
    pub fn new(file: File, block_size: u32) -> Self {
        Self { file, block_size }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn block_offset(&self, block: u32) -> u64 {
        block as u64 * self.block_size as u64
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    pub fn read_block(&self, block: u32, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.block_size as usize);
        self.read_at(self.block_offset(block), buf)
    }

    pub fn write_block(&self, block: u32, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.block_size as usize);
        self.write_at(self.block_offset(block), buf)
    }

    /// Zero-fills `count` blocks starting at `start`, one block per write.
    pub fn zero_blocks(&self, start: u32, count: u32) -> Result<()> {
        let zeros = vec![0u8; self.block_size as usize];
        for block in start..start + count {
            self.write_block(block, &zeros)?;
        }
        Ok(())
    }

    fn entry_offset(&self, dir_start: u32, slot: u32) -> u64 {
        self.block_offset(dir_start) + slot as u64 * ENTRY_SIZE as u64
    }

    /// Reads slot `slot` of the directory whose extent starts at `dir_start`.
    pub fn read_entry(&self, dir_start: u32, slot: u32) -> Result<DirEntry> {
        let mut buf = [0u8; ENTRY_SIZE];
        self.read_at(self.entry_offset(dir_start, slot), &mut buf)?;
        DirEntry::decode(&buf)
    }

    pub fn write_entry(&self, dir_start: u32, slot: u32, entry: &DirEntry) -> Result<()> {
        self.write_at(self.entry_offset(dir_start, slot), &entry.encode())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Reads the superblock record before the block size is known.
pub fn read_superblock(file: &File) -> Result<Superblock> {
    let mut buf = [0u8; SUPERBLOCK_SIZE];
    file.read_exact_at(&mut buf, 0)?;
    Ok(Superblock::decode(&buf))
}

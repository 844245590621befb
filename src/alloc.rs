// src/alloc.rs
//! Contiguous extent allocation over the on-disk free-block bitmap.
//!
//! The bitmap is never loaded whole: it is scanned one bitmap block (a
//! "chunk") at a time, and a commit read-modify-writes only the chunks the
//! extent touches. A set bit means the block is occupied.

use log::debug;

use crate::bitvec::{get_bit, set_bit, unset_bit};
use crate::error::{FsError, Result};
use crate::layout::Superblock;
use crate::volume::Volume;

/// Best-fit tracker fed one bit at a time, in global block order.
///
/// A free run carries across chunk boundaries because the tracker, not the
/// chunk loop, owns `current_start`/`current_len`.
#[derive(Debug)]
pub struct BestFit {
    needed: u32,
    current_start: Option<u32>,
    current_len: u32,
    best: Option<(u32, u32)>,
}

impl BestFit {
    pub fn new(needed: u32) -> Self {
        Self {
            needed,
            current_start: None,
            current_len: 0,
            best: None,
        }
    }

    /// Feeds block `index`. Returns `true` once a run of exactly `needed`
    /// blocks has closed: no later run can beat it.
    pub fn push(&mut self, index: u32, free: bool) -> bool {
        if free {
            if self.current_start.is_none() {
                self.current_start = Some(index);
            }
            self.current_len += 1;
            return false;
        }
        match self.current_start.take() {
            Some(start) => {
                let len = std::mem::take(&mut self.current_len);
                self.consider(start, len)
            }
            None => false,
        }
    }

    fn consider(&mut self, start: u32, len: u32) -> bool {
        if len < self.needed {
            return false;
        }
        if self.best.map_or(true, |(_, best_len)| len < best_len) {
            self.best = Some((start, len));
            return len == self.needed;
        }
        false
    }

    /// Closes a run still open at the end of the bitmap and returns the
    /// start of the smallest sufficient run, if any.
    pub fn finish(mut self) -> Option<u32> {
        if let Some(start) = self.current_start.take() {
            self.consider(start, self.current_len);
        }
        self.best.map(|(start, _)| start)
    }
}

pub fn blocks_for(length: u64, real_block_size: u32) -> u64 {
    length.div_ceil(real_block_size as u64).max(1)
}

/// Allocates the smallest free run that holds `length` bytes (at least one
/// block) and returns its first block.
pub fn contiguous_alloc(volume: &Volume, sb: &Superblock, length: u64) -> Result<u32> {
    let needed = blocks_for(length, sb.real_block_size());
    if needed > sb.total_blocks as u64 {
        return Err(FsError::FsFull {
            blocks_needed: u32::try_from(needed).unwrap_or(u32::MAX),
        });
    }
    let needed = needed as u32;

    let bits_per_chunk = sb.real_block_size() as u64 * 8;
    let mut chunk = vec![0u8; sb.real_block_size() as usize];
    let mut fit = BestFit::new(needed);
    let mut global: u32 = 0;

    'scan: for c in 0..sb.bitmap_size {
        volume.read_block(sb.bitmap_start + c, &mut chunk)?;
        for local in 0..bits_per_chunk as usize {
            if global >= sb.total_blocks {
                break 'scan;
            }
            if fit.push(global, get_bit(&chunk, local) == 0) {
                debug!("alloc: exact fit for {} blocks at {}", needed, global - needed);
                break 'scan;
            }
            global += 1;
        }
    }

    let start = fit.finish().ok_or(FsError::FsFull {
        blocks_needed: needed,
    })?;
    if start < sb.data_start {
        return Err(FsError::ReservedAreaViolation {
            block: start,
            data_start: sb.data_start,
        });
    }

    mark_range(volume, sb, start, needed, true)?;
    debug!("alloc: {} blocks at {}", needed, start);
    Ok(start)
}

/// Releases `length` blocks starting at `start`. Metadata blocks are refused
/// before anything is written.
pub fn contiguous_dealloc(volume: &Volume, sb: &Superblock, start: u32, length: u32) -> Result<()> {
    if start < sb.data_start {
        return Err(FsError::ReservedAreaViolation {
            block: start,
            data_start: sb.data_start,
        });
    }
    if length == 0 {
        return Ok(());
    }
    if start as u64 + length as u64 > sb.total_blocks as u64 {
        return Err(FsError::ExtentOutOfRange {
            start,
            length,
            total_blocks: sb.total_blocks,
        });
    }

    mark_range(volume, sb, start, length, false)?;
    debug!("dealloc: {} blocks at {}", length, start);
    Ok(())
}

/// Sets or clears bits `[start, start+length)`, touching each affected
/// chunk once.
pub(crate) fn mark_range(
    volume: &Volume,
    sb: &Superblock,
    start: u32,
    length: u32,
    occupied: bool,
) -> Result<()> {
    let bits_per_chunk = sb.real_block_size() as u64 * 8;
    let first = start as u64;
    let last = first + length as u64 - 1;
    let mut chunk = vec![0u8; sb.real_block_size() as usize];

    for c in first / bits_per_chunk..=last / bits_per_chunk {
        let block = sb.bitmap_start + c as u32;
        volume.read_block(block, &mut chunk)?;

        let chunk_first = c * bits_per_chunk;
        let lo = first.max(chunk_first) - chunk_first;
        let hi = last.min(chunk_first + bits_per_chunk - 1) - chunk_first;
        for local in lo..=hi {
            if occupied {
                set_bit(&mut chunk, local as usize);
            } else {
                unset_bit(&mut chunk, local as usize);
            }
        }

        volume.write_block(block, &chunk)?;
    }
    Ok(())
}

/// Reads the occupancy of every block, chunk by chunk.
pub fn read_bitmap(volume: &Volume, sb: &Superblock) -> Result<Vec<bool>> {
    let bits_per_chunk = sb.real_block_size() as usize * 8;
    let mut chunk = vec![0u8; sb.real_block_size() as usize];
    let mut bits = Vec::with_capacity(sb.total_blocks as usize);

    for c in 0..sb.bitmap_size {
        volume.read_block(sb.bitmap_start + c, &mut chunk)?;
        let remaining = sb.total_blocks as usize - bits.len();
        bits.extend((0..bits_per_chunk.min(remaining)).map(|i| get_bit(&chunk, i) == 1));
    }
    Ok(bits)
}

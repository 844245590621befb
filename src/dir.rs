// src/dir.rs
//! Directory record store and hierarchy size propagation.
//!
//! A directory is a contiguous extent of fixed 32-byte slots. Slot 0 is `.`
//! (its own start, and the cumulative size cache), slot 1 is `..` (the
//! parent's start). The root is the directory whose `..` points at itself.

use std::collections::HashSet;

use log::{debug, error};

use crate::alloc::blocks_for;
use crate::error::{FsError, Result};
use crate::layout::{DirEntry, EntryKind, EntryStatus, ENTRY_SIZE};
use crate::volume::Volume;

pub const DOT_SLOT: u32 = 0;
pub const DOTDOT_SLOT: u32 = 1;

/// Iterator over every slot of a directory, in slot order.
pub struct Slots<'a> {
    volume: &'a Volume,
    dir_start: u32,
    next: u32,
    count: u32,
}

impl Iterator for Slots<'_> {
    type Item = Result<(u32, DirEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let slot = self.next;
        self.next += 1;
        Some(
            self.volume
                .read_entry(self.dir_start, slot)
                .map(|entry| (slot, entry)),
        )
    }
}

pub fn slots<'a>(volume: &'a Volume, dir: &DirEntry) -> Slots<'a> {
    Slots {
        volume,
        dir_start: dir.start_block,
        next: 0,
        count: slot_count(volume, dir),
    }
}

pub fn slot_count(volume: &Volume, dir: &DirEntry) -> u32 {
    (dir.length as u64 * volume.block_size() as u64 / ENTRY_SIZE as u64) as u32
}

/// VALID entries of `dir`, `.` and `..` included.
pub fn entries<'a>(volume: &'a Volume, dir: &DirEntry) -> impl Iterator<Item = Result<DirEntry>> + 'a {
    slots(volume, dir).filter_map(|res| match res {
        Ok((_, entry)) if entry.is_valid() => Some(Ok(entry)),
        Ok(_) => None,
        Err(e) => Some(Err(e)),
    })
}

/// First VALID entry of `parent` named exactly `name`, with its slot.
pub fn find_entry(volume: &Volume, parent: &DirEntry, name: &str) -> Result<Option<(u32, DirEntry)>> {
    for res in slots(volume, parent) {
        let (slot, entry) = res?;
        if entry.is_valid() && entry.name == name {
            return Ok(Some((slot, entry)));
        }
    }
    Ok(None)
}

pub fn check_duplicate(volume: &Volume, parent: &DirEntry, name: &str) -> Result<bool> {
    Ok(find_entry(volume, parent, name)?.is_some())
}

/// Writes `entry` into the first FREE slot of `parent`. Directories never
/// grow, so a full parent is a regular `ParentFull` error.
pub fn add_entry_to_parent(volume: &Volume, parent: &DirEntry, entry: &DirEntry) -> Result<u32> {
    for res in slots(volume, parent) {
        let (slot, existing) = res?;
        if existing.status == EntryStatus::Free {
            volume.write_entry(parent.start_block, slot, entry)?;
            return Ok(slot);
        }
    }
    Err(FsError::ParentFull)
}

/// Builds a VALID record whose `length` covers `size` bytes (one block at least).
pub fn prepare_entry(name: &str, kind: EntryKind, size: u32, start_block: u32, block_size: u32) -> DirEntry {
    DirEntry {
        status: EntryStatus::Valid,
        name: name.to_string(),
        kind,
        start_block,
        size,
        length: blocks_for(size as u64, block_size) as u32,
    }
}

/// Cached total of the directory starting at `start_block`, read from its `.`.
pub fn dir_size(volume: &Volume, start_block: u32) -> Result<u32> {
    Ok(volume.read_entry(start_block, DOT_SLOT)?.size)
}

/// Adds `delta` bytes to the cached size of the directory at `start_block`
/// and of every ancestor up to the root, clamping at zero.
///
/// Returns the number of directories updated. A missing back-reference
/// stops the walk with `ConsistencyFault`; the levels already written stay
/// written.
pub fn update_hierarchy_size(volume: &Volume, start_block: u32, delta: i64) -> Result<u32> {
    let mut current = start_block;
    let mut visited = HashSet::new();

    loop {
        visited.insert(current);

        let mut dot = volume.read_entry(current, DOT_SLOT)?;
        dot.size = (dot.size as i64 + delta).clamp(0, u32::MAX as i64) as u32;
        volume.write_entry(current, DOT_SLOT, &dot)?;

        let mut dotdot = volume.read_entry(current, DOTDOT_SLOT)?;
        if dotdot.start_block == current {
            dotdot.size = dot.size;
            volume.write_entry(current, DOTDOT_SLOT, &dotdot)?;
            debug!("propagated {:+} bytes through {} levels", delta, visited.len());
            return Ok(visited.len() as u32);
        }

        let parent = dotdot.start_block;
        if visited.contains(&parent) {
            error!("directory {} loops back to {}", current, parent);
            return Err(FsError::ConsistencyFault { child: current, parent });
        }

        let parent_dot = volume.read_entry(parent, DOT_SLOT)?;
        let mut back_ref = None;
        for res in slots(volume, &parent_dot) {
            let (slot, entry) = res?;
            if entry.is_valid() && !entry.is_dot_or_dotdot() && entry.start_block == current {
                back_ref = Some((slot, entry));
                break;
            }
        }
        let Some((slot, mut entry)) = back_ref else {
            error!("no entry for directory {} in parent {}", current, parent);
            return Err(FsError::ConsistencyFault { child: current, parent });
        };
        entry.size = dot.size;
        volume.write_entry(parent, slot, &entry)?;

        current = parent;
    }
}

// src/fs.rs
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use log::{error, info, warn};

use crate::alloc::{contiguous_alloc, contiguous_dealloc, mark_range, read_bitmap};
use crate::dir::{
    self, add_entry_to_parent, check_duplicate, dir_size, find_entry, prepare_entry,
    update_hierarchy_size, DOTDOT_SLOT, DOT_SLOT,
};
use crate::error::{FsError, Result};
use crate::layout::{
    validate_name, DirEntry, EntryKind, EntryStatus, FormatOptions, Superblock, DOT, DOTDOT,
    EMPTY_DIR_SIZE,
};
use crate::volume::{read_superblock, Volume};

/// Display name of the root directory handle.
pub const ROOT_NAME: &str = "/";

/// One row of a recursive listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub level: usize,
    pub name: String,
    pub kind: EntryKind,
    pub size: u32,
    pub start_block: u32,
}

pub struct SacsFilesystem {
    volume: Volume,
    superblock: Superblock,
}

// -----------------------------------------------------------------------------
// Format & mount
// -----------------------------------------------------------------------------

impl SacsFilesystem {
    /// Creates (or overwrites) the image at `path` and lays out an empty
    /// volume. A failure part-way leaves the partial image in place.
    pub fn format(path: &Path, opts: &FormatOptions) -> Result<Superblock> {
        let sb = Superblock::build(opts)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(sb.image_len())?;
        let volume = Volume::new(file, sb.real_block_size());

        // 1. superblock, padded to a full block
        let record = sb.encode();
        let mut block = vec![0u8; sb.real_block_size() as usize];
        block[..record.len()].copy_from_slice(&record);
        volume.write_block(0, &block)?;

        // 2. bitmap, with the whole metadata region marked occupied
        volume.zero_blocks(sb.bitmap_start, sb.bitmap_size)?;
        mark_range(&volume, &sb, 0, sb.data_start, true)?;

        // 3. root directory: `.` and `..` both point at the root itself
        volume.zero_blocks(sb.root_start, sb.root_size)?;
        let mut dot = prepare_entry(DOT, EntryKind::Dir, EMPTY_DIR_SIZE, sb.root_start, sb.real_block_size());
        dot.length = sb.root_size;
        let dotdot = DirEntry {
            name: DOTDOT.to_string(),
            ..dot.clone()
        };
        volume.write_entry(sb.root_start, DOT_SLOT, &dot)?;
        volume.write_entry(sb.root_start, DOTDOT_SLOT, &dotdot)?;

        // 4. data region
        volume.zero_blocks(sb.data_start, sb.data_blocks())?;
        volume.sync()?;

        info!(
            "formatted {:?}: {} blocks of {} bytes, data starts at {}",
            path,
            sb.total_blocks,
            sb.real_block_size(),
            sb.data_start
        );
        Ok(sb)
    }

    /// Opens an existing image for read/write after checking its geometry.
    pub fn mount(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let superblock = read_superblock(&file)?;
        superblock.validate()?;

        let len = file.metadata()?.len();
        if len < superblock.image_len() {
            return Err(FsError::CorruptSuperblock(format!(
                "image holds {} bytes, geometry needs {}",
                len,
                superblock.image_len()
            )));
        }

        info!(
            "mounted {:?} (sysid {:#x}, {} blocks)",
            path, superblock.sysid, superblock.total_blocks
        );
        Ok(Self {
            volume: Volume::new(file, superblock.real_block_size()),
            superblock,
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// Handle on the root directory: its `.` record, displayed as `/`.
    pub fn root(&self) -> Result<DirEntry> {
        let mut root = self.volume.read_entry(self.superblock.root_start, DOT_SLOT)?;
        root.name = ROOT_NAME.to_string();
        Ok(root)
    }

    /// Number of clear bits in the bitmap.
    pub fn free_blocks(&self) -> Result<u32> {
        let bits = read_bitmap(&self.volume, &self.superblock)?;
        Ok(bits.iter().filter(|&&occupied| !occupied).count() as u32)
    }

    /// Cached total of a directory, read from its own `.` entry.
    pub fn dir_size(&self, start_block: u32) -> Result<u32> {
        dir_size(&self.volume, start_block)
    }
}

// -----------------------------------------------------------------------------
// Listing
// -----------------------------------------------------------------------------

impl SacsFilesystem {
    /// Lazily yields the VALID entries of `dir`, `.` and `..` included.
    pub fn list<'a>(&'a self, dir: &DirEntry) -> impl Iterator<Item = Result<DirEntry>> + 'a {
        dir::entries(&self.volume, dir)
    }

    /// Depth-first listing of `dir`. `..` reports the parent's live `.`
    /// size instead of its own stale copy.
    pub fn list_recursive(&self, dir: &DirEntry) -> Result<Vec<TreeEntry>> {
        let mut rows = Vec::new();
        let mut seen = HashSet::from([dir.start_block]);
        self.walk(dir, 0, &mut seen, &mut rows)?;
        Ok(rows)
    }

    fn walk(
        &self,
        dir: &DirEntry,
        level: usize,
        seen: &mut HashSet<u32>,
        rows: &mut Vec<TreeEntry>,
    ) -> Result<()> {
        for entry in self.list(dir) {
            let entry = entry?;
            let size = if entry.name == DOTDOT {
                self.dir_size(entry.start_block)?
            } else {
                entry.size
            };
            rows.push(TreeEntry {
                level,
                name: entry.name.clone(),
                kind: entry.kind,
                size,
                start_block: entry.start_block,
            });

            if entry.is_dir() && !entry.is_dot_or_dotdot() {
                if !seen.insert(entry.start_block) {
                    warn!("directory at block {} reached twice, not descending", entry.start_block);
                    continue;
                }
                self.walk(&entry, level + 1, seen, rows)?;
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Mutations
// -----------------------------------------------------------------------------

impl SacsFilesystem {
    /// Creates a file of `size` bytes holding `data` (cut or zero-padded to
    /// `size`).
    ///
    /// `ConsistencyFault` means the entry was created but an ancestor's size
    /// cache could not be updated.
    pub fn create_file(
        &mut self,
        parent: &mut DirEntry,
        name: &str,
        size: u32,
        data: &[u8],
    ) -> Result<DirEntry> {
        validate_name(name)?;
        if check_duplicate(&self.volume, parent, name)? {
            return Err(FsError::DuplicateName(name.to_string()));
        }

        let start = contiguous_alloc(&self.volume, &self.superblock, size as u64)?;
        let entry = prepare_entry(name, EntryKind::File, size, start, self.superblock.real_block_size());

        let staged = self
            .write_extent(start, size as u64, data)
            .and_then(|_| add_entry_to_parent(&self.volume, parent, &entry));
        if let Err(e) = staged {
            self.rollback(name, &entry);
            return Err(e);
        }

        info!("created file '{}' ({} bytes) at block {}", name, size, start);
        self.propagate(parent, size as i64)?;
        Ok(entry)
    }

    /// Creates an empty directory occupying exactly one block.
    ///
    /// `ConsistencyFault` means the directory was created but an ancestor's
    /// size cache could not be updated.
    pub fn create_dir(&mut self, parent: &mut DirEntry, name: &str) -> Result<DirEntry> {
        validate_name(name)?;
        if check_duplicate(&self.volume, parent, name)? {
            return Err(FsError::DuplicateName(name.to_string()));
        }

        let block_size = self.superblock.real_block_size();
        let start = contiguous_alloc(&self.volume, &self.superblock, block_size as u64)?;
        let mut entry = prepare_entry(name, EntryKind::Dir, block_size, start, block_size);
        entry.size = EMPTY_DIR_SIZE;

        let staged = self
            .init_dir_block(parent, &entry)
            .and_then(|_| add_entry_to_parent(&self.volume, parent, &entry));
        if let Err(e) = staged {
            self.rollback(name, &entry);
            return Err(e);
        }

        info!("created directory '{}' at block {}", name, start);
        self.propagate(parent, EMPTY_DIR_SIZE as i64)?;
        Ok(entry)
    }

    /// Removes a file or an empty directory from `parent` and frees its
    /// extent. Sibling slots are never moved.
    pub fn delete_item(&mut self, parent: &mut DirEntry, name: &str) -> Result<()> {
        let (slot, entry) = find_entry(&self.volume, parent, name)?
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;

        if entry.is_dot_or_dotdot() {
            return Err(FsError::DotEntryDenied);
        }
        if entry.start_block == self.superblock.root_start {
            return Err(FsError::OperationOnRootDenied);
        }
        if entry.is_dir() && entry.size > EMPTY_DIR_SIZE {
            return Err(FsError::NotEmpty(name.to_string()));
        }

        contiguous_dealloc(&self.volume, &self.superblock, entry.start_block, entry.length)?;
        let freed = DirEntry {
            status: EntryStatus::Free,
            ..entry.clone()
        };
        self.volume.write_entry(parent.start_block, slot, &freed)?;

        info!("deleted '{}' ({} blocks at {})", name, entry.length, entry.start_block);
        self.propagate(parent, -(entry.size as i64))
    }

    /// Copies the host file at `external_path` into `parent`, one block at a
    /// time, under the file's base name.
    pub fn import_file(&mut self, parent: &mut DirEntry, external_path: &Path) -> Result<DirEntry> {
        let mut src = File::open(external_path)?;
        let len = src.metadata()?.len();
        let size = u32::try_from(len).map_err(|_| FsError::FileTooLarge(len))?;

        let name = external_path
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| FsError::InvalidName(external_path.display().to_string()))?;
        validate_name(name)?;
        if check_duplicate(&self.volume, parent, name)? {
            return Err(FsError::DuplicateName(name.to_string()));
        }

        let start = contiguous_alloc(&self.volume, &self.superblock, len)?;
        let entry = prepare_entry(name, EntryKind::File, size, start, self.superblock.real_block_size());

        let staged = self
            .copy_in(&mut src, start, len)
            .and_then(|_| add_entry_to_parent(&self.volume, parent, &entry));
        if let Err(e) = staged {
            self.rollback(name, &entry);
            return Err(e);
        }

        info!("imported {:?} as '{}' ({} bytes)", external_path, name, len);
        self.propagate(parent, size as i64)?;
        Ok(entry)
    }

    fn write_extent(&self, start: u32, size: u64, data: &[u8]) -> Result<()> {
        let block_size = self.superblock.real_block_size() as u64;
        let base = self.volume.block_offset(start);
        let mut buf = vec![0u8; block_size as usize];
        let mut offset = 0u64;

        while offset < size {
            let n = block_size.min(size - offset) as usize;
            let chunk = &mut buf[..n];
            chunk.fill(0);
            if let Some(src) = data.get(offset as usize..) {
                let m = n.min(src.len());
                chunk[..m].copy_from_slice(&src[..m]);
            }
            self.volume.write_at(base + offset, chunk)?;
            offset += n as u64;
        }
        Ok(())
    }

    fn copy_in<R: Read>(&self, src: &mut R, start: u32, len: u64) -> Result<()> {
        let block_size = self.superblock.real_block_size() as u64;
        let base = self.volume.block_offset(start);
        let mut buf = vec![0u8; block_size as usize];
        let mut offset = 0u64;

        while offset < len {
            let n = block_size.min(len - offset) as usize;
            src.read_exact(&mut buf[..n])?;
            self.volume.write_at(base + offset, &buf[..n])?;
            offset += n as u64;
        }
        Ok(())
    }

    /// Zero-fills a new directory block and writes its `.` and `..`.
    fn init_dir_block(&self, parent: &DirEntry, entry: &DirEntry) -> Result<()> {
        self.volume.zero_blocks(entry.start_block, entry.length)?;
        let dot = DirEntry {
            name: DOT.to_string(),
            ..entry.clone()
        };
        let dotdot = DirEntry {
            status: EntryStatus::Valid,
            name: DOTDOT.to_string(),
            kind: EntryKind::Dir,
            start_block: parent.start_block,
            size: self.dir_size(parent.start_block)?,
            length: parent.length,
        };
        self.volume.write_entry(entry.start_block, DOT_SLOT, &dot)?;
        self.volume.write_entry(entry.start_block, DOTDOT_SLOT, &dotdot)
    }

    /// Releases the extent of an entry that never made it into its parent.
    fn rollback(&self, name: &str, entry: &DirEntry) {
        warn!("rolling back '{}': freeing {} blocks at {}", name, entry.length, entry.start_block);
        if let Err(e) = contiguous_dealloc(&self.volume, &self.superblock, entry.start_block, entry.length) {
            error!("rollback of '{}' failed: {}", name, e);
        }
    }

    /// Pushes `delta` up the tree, then refreshes the caller's handle from
    /// disk so it matches the committed `.` value.
    fn propagate(&self, parent: &mut DirEntry, delta: i64) -> Result<()> {
        let walked = update_hierarchy_size(&self.volume, parent.start_block, delta);
        parent.size = self.dir_size(parent.start_block)?;
        walked.map(|_| ())
    }
}

// -----------------------------------------------------------------------------
// Navigation & export
// -----------------------------------------------------------------------------

impl SacsFilesystem {
    /// Moves `current` into its child directory `target` (`.` and `..`
    /// included). On error `current` is left untouched.
    pub fn change_directory(&self, current: &mut DirEntry, target: &str) -> Result<()> {
        let (_, entry) = find_entry(&self.volume, current, target)?
            .ok_or_else(|| FsError::NotFound(target.to_string()))?;
        if !entry.is_dir() {
            return Err(FsError::NotADirectory(target.to_string()));
        }

        let mut next = self.volume.read_entry(entry.start_block, DOT_SLOT)?;
        next.name = match target {
            DOT => current.name.clone(),
            DOTDOT => self.dir_name(entry.start_block)?,
            _ => target.to_string(),
        };
        *current = next;
        Ok(())
    }

    /// Resolves a `/`-separated path from the root, one `change_directory`
    /// per component.
    pub fn open_dir(&self, path: &str) -> Result<DirEntry> {
        let mut dir = self.root()?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            self.change_directory(&mut dir, component)?;
        }
        Ok(dir)
    }

    /// Human-readable name of the directory at `start_block`, found through
    /// its parent's entry for it.
    fn dir_name(&self, start_block: u32) -> Result<String> {
        if start_block == self.superblock.root_start {
            return Ok(ROOT_NAME.to_string());
        }
        let parent = self.volume.read_entry(start_block, DOTDOT_SLOT)?.start_block;
        let parent_dot = self.volume.read_entry(parent, DOT_SLOT)?;
        for entry in self.list(&parent_dot) {
            let entry = entry?;
            if !entry.is_dot_or_dotdot() && entry.start_block == start_block {
                return Ok(entry.name);
            }
        }
        Err(FsError::ConsistencyFault {
            child: start_block,
            parent,
        })
    }

    fn lookup_file(&self, parent: &DirEntry, name: &str) -> Result<DirEntry> {
        let (_, entry) = find_entry(&self.volume, parent, name)?
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        if entry.is_dir() {
            return Err(FsError::IsADirectory(name.to_string()));
        }
        Ok(entry)
    }

    /// Streams the content of file `name` into `out`; returns the byte count.
    pub fn export_to<W: Write>(&self, parent: &DirEntry, name: &str, out: &mut W) -> Result<u64> {
        let entry = self.lookup_file(parent, name)?;
        self.copy_out(&entry, out)
    }

    /// Copies file `name` to a newly created host file at `dest`.
    pub fn export_file(&self, parent: &DirEntry, name: &str, dest: &Path) -> Result<u64> {
        let entry = self.lookup_file(parent, name)?;
        let mut out = File::create(dest)?;
        let written = self.copy_out(&entry, &mut out)?;
        out.flush()?;
        info!("exported '{}' to {:?} ({} bytes)", name, dest, written);
        Ok(written)
    }

    pub fn read_file(&self, parent: &DirEntry, name: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.export_to(parent, name, &mut data)?;
        Ok(data)
    }

    fn copy_out<W: Write>(&self, entry: &DirEntry, out: &mut W) -> Result<u64> {
        let block_size = self.superblock.real_block_size() as u64;
        let base = self.volume.block_offset(entry.start_block);
        let size = entry.size as u64;
        let mut buf = vec![0u8; block_size as usize];
        let mut offset = 0u64;

        while offset < size {
            let n = block_size.min(size - offset) as usize;
            self.volume.read_at(base + offset, &mut buf[..n])?;
            out.write_all(&buf[..n])?;
            offset += n as u64;
        }
        Ok(size)
    }
}

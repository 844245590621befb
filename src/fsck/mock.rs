/*Backend en memoria para las pruebas. Arma a mano un volumen recién
formateado (20 bloques, datos desde el 6) y permite agregar archivos y
directorios o romperlo para ver qué reporta el fsck. */

use std::collections::HashMap;

use super::fsck_backend::FsckBackend;
use crate::dir::prepare_entry;
use crate::error::{FsError, Result};
use crate::layout::{DirEntry, EntryKind, FormatOptions, Superblock, DOT, DOTDOT, EMPTY_DIR_SIZE};

pub struct MockBackend {
    pub superblock: Superblock,
    pub bitmap: Vec<bool>,
    pub dirs: HashMap<u32, Vec<DirEntry>>,
}

impl MockBackend {
    /// A freshly formatted default volume (20 blocks, data from block 6).
    pub fn formatted() -> Self {
        let superblock = Superblock::build(&FormatOptions::default()).unwrap();
        let mut bitmap = vec![false; superblock.total_blocks as usize];
        bitmap[..superblock.data_start as usize].fill(true);

        let mut dot = prepare_entry(DOT, EntryKind::Dir, EMPTY_DIR_SIZE, superblock.root_start, 2048);
        dot.length = superblock.root_size;
        let dotdot = DirEntry {
            name: DOTDOT.into(),
            ..dot.clone()
        };

        Self {
            superblock,
            bitmap,
            dirs: HashMap::from([(superblock.root_start, vec![dot, dotdot])]),
        }
    }

    pub fn root_mut(&mut self) -> &mut Vec<DirEntry> {
        self.dirs.get_mut(&self.superblock.root_start).unwrap()
    }

    fn grow_root(&mut self, entry: DirEntry) {
        let size = entry.size;
        let root = self.root_mut();
        root.push(entry);
        root[0].size += size;
        root[1].size += size;
    }

    pub fn add_file(&mut self, name: &str, start: u32, size: u32) {
        let entry = prepare_entry(name, EntryKind::File, size, start, 2048);
        for block in start..start + entry.length {
            self.bitmap[block as usize] = true;
        }
        self.grow_root(entry);
    }

    pub fn add_dir(&mut self, name: &str, start: u32) {
        let mut entry = prepare_entry(name, EntryKind::Dir, 2048, start, 2048);
        entry.size = EMPTY_DIR_SIZE;
        self.bitmap[start as usize] = true;

        let root_start = self.superblock.root_start;
        let dot = DirEntry {
            name: DOT.into(),
            ..entry.clone()
        };
        let dotdot = prepare_entry(DOTDOT, EntryKind::Dir, EMPTY_DIR_SIZE, root_start, 2048);
        self.dirs.insert(start, vec![dot, dotdot]);
        self.grow_root(entry);
    }
}

impl FsckBackend for MockBackend {
    fn load_superblock(&self) -> Result<Superblock> {
        Ok(self.superblock)
    }

    fn load_bitmap(&self) -> Result<Vec<bool>> {
        Ok(self.bitmap.clone())
    }

    fn read_dir(&self, start_block: u32) -> Result<Vec<DirEntry>> {
        self.dirs
            .get(&start_block)
            .cloned()
            .ok_or_else(|| FsError::NotFound(format!("directory at block {}", start_block)))
    }
}

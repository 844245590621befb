#![allow(dead_code)]

use std::path::PathBuf;

use sacs::{FormatOptions, SacsFilesystem};
use tempfile::TempDir;

/// A formatted image inside a scratch directory that lives as long as the
/// value does.
pub struct Scratch {
    pub dir: TempDir,
    pub image: PathBuf,
    pub fs: SacsFilesystem,
}

impl Scratch {
    pub fn new(opts: FormatOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("disk.img");
        SacsFilesystem::format(&image, &opts).unwrap();
        let fs = SacsFilesystem::mount(&image).unwrap();
        Self { dir, image, fs }
    }

    /// 80 sectors of 512 bytes, 2 KiB blocks, 4 root blocks: 20 blocks,
    /// data from block 6.
    pub fn default_volume() -> Self {
        Self::new(FormatOptions::default())
    }

    /// 2000 blocks of 64 bytes: the bitmap spans four blocks, data from 7.
    pub fn multi_chunk() -> Self {
        Self::new(FormatOptions {
            sector_count: 2000,
            sector_size_exp: 6,
            block_size_exp: 0,
            root_blocks: 2,
            ..FormatOptions::default()
        })
    }

    /// 500 blocks of 2 KiB with a single-block root (64 slots).
    pub fn small_root() -> Self {
        Self::new(FormatOptions {
            sector_count: 2000,
            root_blocks: 1,
            ..FormatOptions::default()
        })
    }

    pub fn bitmap(&self) -> Vec<bool> {
        sacs::read_bitmap(self.fs.volume(), self.fs.superblock()).unwrap()
    }

    /// Drops the handle and mounts the image again.
    pub fn remount(self) -> Self {
        let Scratch { dir, image, fs } = self;
        drop(fs);
        let fs = SacsFilesystem::mount(&image).unwrap();
        Self { dir, image, fs }
    }
}

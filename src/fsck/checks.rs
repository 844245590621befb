/*Archivo principal del fsck. Aquí está run_fsck y las validaciones:
superblock, bits de metadatos, árbol de directorios (., .., tamaños
cacheados, nombres repetidos), extents fuera de rango o compartidos
y bloques marcados como usados que nadie referencia. */
use std::collections::HashSet;

use super::{fsck_backend::FsckBackend, fsck_types::FsckReport};
use crate::error::Result;
use crate::layout::{DirEntry, Superblock, DOT, DOTDOT, EMPTY_DIR_SIZE};

/// A directory waiting to be checked.
struct Pending {
    path: String,
    start: u32,
    parent: u32,
    /// Size recorded for this directory by its parent's entry.
    expected_size: Option<u32>,
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn check_metadata_bits(sb: &Superblock, bitmap: &[bool], report: &mut FsckReport) {
    for block in 0..sb.data_start as usize {
        if !bitmap[block] {
            report.block_error(format!("metadata block {} is marked free", block));
        }
    }
}

/// Claims the extent of `entry` for `path`, reporting range, bitmap and
/// overlap problems.
fn claim_extent(
    sb: &Superblock,
    bitmap: &[bool],
    owners: &mut [Option<String>],
    path: &str,
    entry: &DirEntry,
    report: &mut FsckReport,
) {
    let start = entry.start_block as u64;
    let end = start + entry.length as u64;
    if entry.length == 0 || start < sb.data_start as u64 || end > sb.total_blocks as u64 {
        report.block_error(format!(
            "{}: extent {}+{} lies outside the data region [{}, {})",
            path, entry.start_block, entry.length, sb.data_start, sb.total_blocks
        ));
        return;
    }

    for block in start as usize..end as usize {
        if !bitmap[block] {
            report.block_error(format!("{}: block {} is marked free", path, block));
        }
        match &owners[block] {
            Some(other) => report.block_error(format!(
                "block {} is shared by {} and {}",
                block, other, path
            )),
            None => owners[block] = Some(path.to_string()),
        }
    }
}

fn check_tree<B: FsckBackend>(
    backend: &B,
    sb: &Superblock,
    bitmap: &[bool],
    owners: &mut [Option<String>],
    report: &mut FsckReport,
) -> Result<()> {
    let root_end = (sb.root_start + sb.root_size) as usize;
    for owner in &mut owners[sb.root_start as usize..root_end] {
        *owner = Some("/".to_string());
    }

    let mut visited = HashSet::new();
    let mut stack = vec![Pending {
        path: "/".to_string(),
        start: sb.root_start,
        parent: sb.root_start,
        expected_size: None,
    }];

    while let Some(dir) = stack.pop() {
        if !visited.insert(dir.start) {
            report.entry_error(format!("{}: directory at block {} is reachable twice", dir.path, dir.start));
            continue;
        }

        let entries = backend.read_dir(dir.start)?;
        let (dot, dotdot) = match entries.as_slice() {
            [dot, dotdot, ..] if dot.name == DOT && dotdot.name == DOTDOT => (dot, dotdot),
            _ => {
                report.entry_error(format!("{}: first slots are not '.' and '..'", dir.path));
                continue;
            }
        };

        if dot.start_block != dir.start {
            report.entry_error(format!(
                "{}: '.' points at block {} instead of {}",
                dir.path, dot.start_block, dir.start
            ));
        }
        if dotdot.start_block != dir.parent {
            report.entry_error(format!(
                "{}: '..' points at block {} instead of {}",
                dir.path, dotdot.start_block, dir.parent
            ));
        }
        if dir.start == sb.root_start {
            if dot.length != sb.root_size {
                report.entry_error(format!(
                    "/: '.' spans {} blocks, root has {}",
                    dot.length, sb.root_size
                ));
            }
            if dotdot.size != dot.size {
                report.entry_error(format!(
                    "/: '..' caches {} bytes, '.' caches {}",
                    dotdot.size, dot.size
                ));
            }
        }
        if let Some(expected) = dir.expected_size {
            if expected != dot.size {
                report.entry_error(format!(
                    "{}: parent entry caches {} bytes, '.' caches {}",
                    dir.path, expected, dot.size
                ));
            }
        }

        let mut names = HashSet::new();
        let mut total = EMPTY_DIR_SIZE as u64;
        for child in entries.iter().skip(2) {
            let path = child_path(&dir.path, &child.name);
            if child.is_dot_or_dotdot() || !names.insert(child.name.as_str()) {
                report.entry_error(format!("{}: duplicate name", path));
            }
            total += child.size as u64;
            claim_extent(sb, bitmap, owners, &path, child, report);

            if child.is_dir() {
                stack.push(Pending {
                    path,
                    start: child.start_block,
                    parent: dir.start,
                    expected_size: Some(child.size),
                });
            }
        }

        if total != dot.size as u64 {
            report.entry_error(format!(
                "{}: '.' caches {} bytes, entries add up to {}",
                dir.path, dot.size, total
            ));
        }
    }
    Ok(())
}

fn check_leaks(sb: &Superblock, bitmap: &[bool], owners: &[Option<String>], report: &mut FsckReport) {
    for block in sb.data_start as usize..sb.total_blocks as usize {
        if bitmap[block] && owners[block].is_none() {
            report.block_error(format!("block {} is marked used but unreferenced", block));
        }
    }
}

pub fn run_fsck<B: FsckBackend>(backend: &B) -> Result<FsckReport> {
    let mut report = FsckReport::new();

    // superblock first: nothing else can be trusted without it
    let sb = backend.load_superblock()?;
    if let Err(e) = sb.validate() {
        report.entry_error(e.to_string());
        return Ok(report);
    }

    let bitmap = backend.load_bitmap()?;
    if bitmap.len() != sb.total_blocks as usize {
        report.block_error(format!(
            "bitmap holds {} bits for {} blocks",
            bitmap.len(),
            sb.total_blocks
        ));
        return Ok(report);
    }

    check_metadata_bits(&sb, &bitmap, &mut report);

    let mut owners = vec![None; sb.total_blocks as usize];
    check_tree(backend, &sb, &bitmap, &mut owners, &mut report)?;
    check_leaks(&sb, &bitmap, &owners, &mut report);

    Ok(report)
}

// src/bin/sacs.rs
//! One-shot commands against a SACS image. Paths inside the image are
//! `/`-separated and start at the root.
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sacs::{DirEntry, EntryKind, FsError, SacsFilesystem};

#[derive(Debug, Parser)]
#[command(name = "sacs", version)]
struct Cli {
    /// Image file to operate on
    image: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the superblock and free space
    Info,
    /// List one directory
    Ls {
        #[arg(default_value = "/")]
        dir: String,
    },
    /// List a directory and everything below it
    Tree {
        #[arg(default_value = "/")]
        dir: String,
    },
    /// Create an empty directory
    Mkdir { path: String },
    /// Create a file holding TEXT
    Write { path: String, text: String },
    /// Copy a host file into DIR
    Put {
        host_file: PathBuf,
        #[arg(default_value = "/")]
        dir: String,
    },
    /// Copy a file out to the host
    Get { path: String, dest: PathBuf },
    /// Print a file to stdout
    Cat { path: String },
    /// Delete a file or an empty directory
    Rm { path: String },
}

/// Splits `a/b/c` into the directory handle for `a/b` and the name `c`.
fn split_path(fs: &SacsFilesystem, path: &str) -> Result<(DirEntry, String)> {
    let trimmed = path.trim_end_matches('/');
    let (dir, name) = trimmed.rsplit_once('/').unwrap_or(("", trimmed));
    let parent = fs
        .open_dir(dir)
        .with_context(|| format!("cannot open directory '{}'", dir))?;
    Ok((parent, name.to_string()))
}

fn kind_char(kind: EntryKind) -> char {
    match kind {
        EntryKind::Dir => 'D',
        _ => 'F',
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut fs = SacsFilesystem::mount(&cli.image)
        .with_context(|| format!("could not mount {:?}", cli.image))?;

    match cli.command {
        Command::Info => {
            println!("{}", fs.superblock());
            println!("Free blocks  = {}", fs.free_blocks()?);
        }
        Command::Ls { dir } => {
            let dir = fs.open_dir(&dir)?;
            for entry in fs.list(&dir) {
                let entry = entry?;
                println!("[{}] {:<16} {:>10} bytes", kind_char(entry.kind), entry.name, entry.size);
            }
        }
        Command::Tree { dir } => {
            let dir = fs.open_dir(&dir)?;
            println!("{} ({} bytes)", dir.name, dir.size);
            for row in fs.list_recursive(&dir)? {
                println!(
                    "{}-- [{}] {} ({} bytes)",
                    "   |".repeat(row.level),
                    kind_char(row.kind),
                    row.name,
                    row.size
                );
            }
        }
        Command::Mkdir { path } => {
            let (mut parent, name) = split_path(&fs, &path)?;
            let entry = fs.create_dir(&mut parent, &name)?;
            println!("directory '{}' created at block {}", name, entry.start_block);
        }
        Command::Write { path, text } => {
            let (mut parent, name) = split_path(&fs, &path)?;
            let size = u32::try_from(text.len()).map_err(|_| FsError::FileTooLarge(text.len() as u64))?;
            let entry = fs.create_file(&mut parent, &name, size, text.as_bytes())?;
            println!("file '{}' created at block {}", name, entry.start_block);
        }
        Command::Put { host_file, dir } => {
            let mut parent = fs.open_dir(&dir)?;
            let entry = fs.import_file(&mut parent, &host_file)?;
            println!("imported '{}' ({} bytes) at block {}", entry.name, entry.size, entry.start_block);
        }
        Command::Get { path, dest } => {
            let (parent, name) = split_path(&fs, &path)?;
            let n = fs.export_file(&parent, &name, &dest)?;
            println!("exported {} bytes to {:?}", n, dest);
        }
        Command::Cat { path } => {
            let (parent, name) = split_path(&fs, &path)?;
            let mut out = io::stdout().lock();
            fs.export_to(&parent, &name, &mut out)?;
            out.flush()?;
        }
        Command::Rm { path } => {
            let (mut parent, name) = split_path(&fs, &path)?;
            fs.delete_item(&mut parent, &name)?;
            println!("'{}' deleted", name);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sacs: {:#}", e);
            let code = e.downcast_ref::<FsError>().map_or(1, FsError::as_errno);
            ExitCode::from(code as u8)
        }
    }
}

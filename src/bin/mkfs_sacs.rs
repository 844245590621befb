// src/bin/mkfs_sacs.rs
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sacs::{FormatOptions, SacsFilesystem, ENTRY_SIZE, SUPERBLOCK_SIZE};

/// Formats a file as an empty SACS volume.
#[derive(Debug, Parser)]
#[command(name = "mkfs.sacs", version)]
struct Args {
    /// Image file to create (overwritten if present)
    image: PathBuf,

    /// Volume identifier, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_u32)]
    sysid: Option<u32>,

    /// Capacity in sectors
    #[arg(short = 'n', long)]
    sectors: Option<u32>,

    /// Sector size exponent (sector = 2^exp bytes)
    #[arg(long)]
    sector_exp: Option<u16>,

    /// Block size exponent (block = 2^exp sectors)
    #[arg(long)]
    block_exp: Option<u16>,

    /// Blocks reserved for the root directory
    #[arg(long)]
    root_blocks: Option<u32>,
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let defaults = FormatOptions::default();
    let opts = FormatOptions {
        sysid: args.sysid.unwrap_or(defaults.sysid),
        sector_count: args.sectors.unwrap_or(defaults.sector_count),
        sector_size_exp: args.sector_exp.unwrap_or(defaults.sector_size_exp),
        block_size_exp: args.block_exp.unwrap_or(defaults.block_size_exp),
        root_blocks: args.root_blocks.unwrap_or(defaults.root_blocks),
    };

    let sb = SacsFilesystem::format(&args.image, &opts)
        .with_context(|| format!("could not format {:?}", args.image))?;

    println!("{}", sb);
    println!(
        "mkfs.sacs: {:?} ready, {} data blocks, {} root entries (superblock {} B, entry {} B).",
        args.image,
        sb.data_blocks(),
        sb.root_size * sb.entries_per_block(),
        SUPERBLOCK_SIZE,
        ENTRY_SIZE
    );
    Ok(())
}

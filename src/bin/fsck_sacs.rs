// src/bin/fsck_sacs.rs
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use sacs::{fsck, SacsFilesystem};

/// Checks a SACS image for bitmap and directory inconsistencies.
#[derive(Debug, Parser)]
#[command(name = "fsck.sacs", version)]
struct Args {
    /// Image file to check
    image: PathBuf,
}

fn status_line(ok: bool, good: &str, bad: &str) {
    if ok {
        println!("  {} {}", "✓".green(), good);
    } else {
        println!("  {} {}", "✗".red(), bad);
    }
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let fs = SacsFilesystem::mount(&args.image)
        .with_context(|| format!("could not open {:?}", args.image))?;
    let rep = fsck::run_fsck(&fs).context("check aborted")?;

    println!("\n{}", " SACS FILESYSTEM CHECK ".on_blue().bold());
    println!("{}", "──────────────────────────────────────────".blue());

    println!("\n{}", "Blocks".bold().underline());
    status_line(rep.blocks_ok, "bitmap and extents agree", "bitmap or extent errors");

    println!("\n{}", "Directories".bold().underline());
    status_line(rep.entries_ok, "entries and size caches agree", "directory errors");

    println!("\n{}", "Findings".bold().underline());
    if rep.errors.is_empty() {
        println!("  {} nothing found", "✓".green());
    } else {
        for err in &rep.errors {
            println!("  {} {}", "•".red(), err.red());
        }
    }

    println!("\n{}", "Summary".bold().underline());
    if rep.is_clean() {
        println!("{} volume is clean.\n", "✓ OK".green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} {} problems found.\n",
            "✗ fsck finished with errors:".red().bold(),
            rep.errors.len().to_string().yellow()
        );
        Ok(ExitCode::FAILURE)
    }
}

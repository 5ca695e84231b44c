use crate::output;
use anyhow::{Context, Result};
use opskit_core::shortcuts;
use std::path::PathBuf;

#[derive(clap::Subcommand)]
pub enum ShortcutsSubcommand {
    /// List launchers whose program no longer exists
    Scan {
        /// Directories to scan (default: ~/.local/share/applications)
        dirs: Vec<PathBuf>,
    },

    /// Delete launchers whose program no longer exists
    Clean {
        /// Directories to scan (default: ~/.local/share/applications)
        dirs: Vec<PathBuf>,

        /// List what would be deleted without touching anything
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(subcommand: ShortcutsSubcommand, json: bool) -> Result<()> {
    match subcommand {
        ShortcutsSubcommand::Scan { dirs } => cmd_scan(dirs, json),
        ShortcutsSubcommand::Clean { dirs, dry_run } => cmd_clean(dirs, dry_run, json),
    }
}

fn scan(dirs: Vec<PathBuf>) -> Result<shortcuts::ScanReport> {
    let dirs = if dirs.is_empty() {
        vec![shortcuts::default_scan_dir()?]
    } else {
        dirs
    };
    shortcuts::scan_dirs(&dirs).context("launcher scan failed")
}

fn cmd_scan(dirs: Vec<PathBuf>, json: bool) -> Result<()> {
    let report = scan(dirs)?;
    if json {
        return output::print_json(&report);
    }

    if report.broken.is_empty() {
        println!("Scanned {} launcher(s); none broken.", report.scanned);
        return Ok(());
    }
    print_broken(&report);
    println!("\nRun `opskit shortcuts clean` to delete them.");
    Ok(())
}

fn cmd_clean(dirs: Vec<PathBuf>, dry_run: bool, json: bool) -> Result<()> {
    let report = scan(dirs)?;
    let removed = shortcuts::clean(&report.broken, dry_run)?;

    if json {
        return output::print_json(&serde_json::json!({
            "scanned": report.scanned,
            "broken": report.broken,
            "removed": removed,
            "dry_run": dry_run,
        }));
    }

    if report.broken.is_empty() {
        println!("Scanned {} launcher(s); nothing to clean.", report.scanned);
        return Ok(());
    }
    print_broken(&report);
    if dry_run {
        println!("\nDry run: {} file(s) left in place.", removed.len());
    } else {
        println!("\nDeleted {} launcher file(s).", removed.len());
    }
    Ok(())
}

fn print_broken(report: &shortcuts::ScanReport) {
    let rows = report
        .broken
        .iter()
        .map(|b| {
            vec![
                b.name.clone(),
                b.target.clone(),
                b.reason.to_string(),
                b.path.display().to_string(),
            ]
        })
        .collect();
    output::print_table(&["NAME", "TARGET", "REASON", "FILE"], rows);
}

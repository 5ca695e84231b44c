use crate::output;
use anyhow::{Context, Result};
use opskit_core::paths;
use opskit_core::tune::{self, TuneProfile};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum TuneSubcommand {
    /// Write the default profile file if missing
    Init {
        /// Profile path (default: ~/.config/opskit/tune.yaml)
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Show current vs desired system state; never changes anything
    Status {
        /// Profile file override
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Bring sysctl keys, services, and the firewall in line with the profile
    Apply {
        /// Profile file override
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Restore the sysctl values backed up by the first apply
    Revert {
        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(subcommand: TuneSubcommand, json: bool) -> Result<()> {
    match subcommand {
        TuneSubcommand::Init { profile } => cmd_init(profile),
        TuneSubcommand::Status { profile } => cmd_status(profile.as_deref(), json),
        TuneSubcommand::Apply { profile, dry_run } => cmd_apply(profile.as_deref(), dry_run),
        TuneSubcommand::Revert { dry_run } => cmd_revert(dry_run),
    }
}

fn load_profile(path: Option<&Path>) -> Result<TuneProfile> {
    match path {
        Some(p) => TuneProfile::load_from(p)
            .with_context(|| format!("failed to load profile {}", p.display())),
        None => TuneProfile::load_default().context("failed to load tuning profile"),
    }
}

// ---------------------------------------------------------------------------
// tune init
// ---------------------------------------------------------------------------

fn cmd_init(profile: Option<PathBuf>) -> Result<()> {
    let path = match profile {
        Some(p) => p,
        None => paths::tune_profile_path()?,
    };
    if TuneProfile::init(&path)? {
        println!("Wrote default profile to {}", path.display());
    } else {
        println!("Profile already exists at {} (left unchanged)", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// tune status
// ---------------------------------------------------------------------------

fn cmd_status(profile: Option<&Path>, json: bool) -> Result<()> {
    let profile = load_profile(profile)?;
    let status = tune::status(&profile);
    if json {
        return output::print_json(&status);
    }

    let unknown = || "?".to_string();
    println!("Sysctl:");
    let rows = status
        .sysctl
        .iter()
        .map(|s| {
            vec![
                s.key.clone(),
                s.current.clone().unwrap_or_else(unknown),
                s.desired.clone(),
                s.state.as_str().to_string(),
            ]
        })
        .collect();
    output::print_table(&["KEY", "CURRENT", "DESIRED", "STATE"], rows);

    if !status.services.is_empty() {
        println!("\nServices:");
        let rows = status
            .services
            .iter()
            .map(|s| {
                vec![
                    s.unit.clone(),
                    s.current.clone().unwrap_or_else(unknown),
                    s.action.desired_state().to_string(),
                    s.state.as_str().to_string(),
                ]
            })
            .collect();
        output::print_table(&["UNIT", "CURRENT", "DESIRED", "STATE"], rows);
    }

    if !status.packages.is_empty() {
        println!("\nPackages:");
        let rows = status
            .packages
            .iter()
            .map(|p| {
                let state = match p.installed {
                    Some(true) => "installed",
                    Some(false) => "missing",
                    None => "unknown",
                };
                vec![p.package.clone(), state.to_string()]
            })
            .collect();
        output::print_table(&["PACKAGE", "STATE"], rows);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// tune apply
// ---------------------------------------------------------------------------

fn cmd_apply(profile: Option<&Path>, dry_run: bool) -> Result<()> {
    let profile = load_profile(profile)?;
    let snap = tune::snapshot(&profile);
    let planned = tune::plan(&profile, &snap);

    if planned.is_empty() {
        println!("System already matches the profile.");
        return Ok(());
    }
    if dry_run {
        for p in &planned {
            println!("{}", p.cmd.display());
        }
        return Ok(());
    }

    // Snapshot the pre-tune sysctl values once; later applies keep the
    // original backup.
    let backup_path = paths::tune_backup_path()?;
    if tune::write_backup(&backup_path, &snap.status)? {
        println!("Backed up current sysctl values to {}", backup_path.display());
    }

    for p in &planned {
        println!("applying: {}", p.label);
        p.cmd
            .run_checked()
            .with_context(|| format!("failed while applying: {}", p.label))?;
    }
    println!("Applied {} change(s).", planned.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// tune revert
// ---------------------------------------------------------------------------

fn cmd_revert(dry_run: bool) -> Result<()> {
    let backup_path = paths::tune_backup_path()?;
    let Some(backup) = tune::load_backup(&backup_path)? else {
        println!("No backup at {}; nothing to revert.", backup_path.display());
        return Ok(());
    };

    let conf_exists = Path::new(paths::SYSCTL_CONF_PATH).exists();
    let planned = tune::revert_plan(&backup, conf_exists);
    if dry_run {
        for p in &planned {
            println!("{}", p.cmd.display());
        }
        return Ok(());
    }

    for p in &planned {
        println!("reverting: {}", p.label);
        p.cmd
            .run_checked()
            .with_context(|| format!("failed while reverting: {}", p.label))?;
    }

    // A consumed backup would otherwise block the next apply from snapshotting.
    std::fs::remove_file(&backup_path)
        .with_context(|| format!("failed to remove {}", backup_path.display()))?;
    println!(
        "Reverted {} sysctl value(s) from the {} backup.",
        backup.sysctl.len(),
        backup.created_at.format("%Y-%m-%d")
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// setup
// ---------------------------------------------------------------------------

/// `opskit setup`: apt-get update, then install the profile packages that
/// dpkg-query reports absent. With dpkg-query unavailable every package is
/// treated as missing; apt-get install is idempotent.
pub fn setup(profile: Option<&Path>, dry_run: bool, json: bool) -> Result<()> {
    let profile = load_profile(profile)?;
    let missing: Vec<String> = profile
        .packages
        .iter()
        .filter(|pkg| tune::package_installed(pkg) != Some(true))
        .cloned()
        .collect();

    if missing.is_empty() {
        if json {
            return output::print_json(&serde_json::json!({
                "packages": profile.packages,
                "missing": missing,
                "installed": Vec::<String>::new(),
            }));
        }
        println!(
            "All {} profile package(s) are already installed.",
            profile.packages.len()
        );
        return Ok(());
    }

    let planned = tune::setup_plan(&missing);
    if dry_run {
        if json {
            return output::print_json(&serde_json::json!({
                "packages": profile.packages,
                "missing": missing,
                "commands": planned.iter().map(|p| p.cmd.display()).collect::<Vec<_>>(),
            }));
        }
        for p in &planned {
            println!("{}", p.cmd.display());
        }
        return Ok(());
    }

    for p in &planned {
        println!("running: {}", p.label);
        p.cmd
            .run_checked()
            .with_context(|| format!("failed while running: {}", p.label))?;
    }
    if json {
        return output::print_json(&serde_json::json!({
            "packages": profile.packages,
            "missing": missing,
            "installed": missing,
        }));
    }
    println!("Installed {} package(s).", missing.len());
    Ok(())
}

use crate::output;
use anyhow::{Context, Result};
use opskit_core::config::Config;
use opskit_core::mirror::{self, MirrorJob};

#[allow(clippy::too_many_arguments)]
pub fn run(
    source: Option<&str>,
    dest: Option<&str>,
    job: Option<&str>,
    delete: bool,
    exclude: Vec<String>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let mut job = resolve_job(source, dest, job)?;
    if delete {
        job.delete = true;
    }
    job.excludes.extend(exclude);

    let outcome = mirror::run(&job, dry_run).context("mirror failed")?;

    if outcome.vanished_warning {
        tracing::warn!("some source files vanished during the transfer (rsync exit 24)");
    }
    if json {
        return output::print_json(&outcome);
    }

    let fmt = |n: Option<u64>| n.map_or_else(|| "?".to_string(), |v| v.to_string());
    if dry_run {
        println!("Dry run (nothing copied):");
    }
    println!(
        "Files: {} total, {} transferred. Bytes sent: {}.",
        fmt(outcome.stats.files_total),
        fmt(outcome.stats.files_transferred),
        fmt(outcome.stats.bytes_sent),
    );
    if outcome.vanished_warning {
        println!("Warning: some source files vanished mid-transfer.");
    }
    Ok(())
}

fn resolve_job(source: Option<&str>, dest: Option<&str>, job: Option<&str>) -> Result<MirrorJob> {
    if let Some(name) = job {
        let config = Config::load().context("failed to load config")?;
        return config
            .job(name)
            .cloned()
            .with_context(|| format!("no mirror job '{name}' in the config file"));
    }
    match (source, dest) {
        (Some(source), Some(dest)) => Ok(MirrorJob::adhoc(source, dest)),
        _ => anyhow::bail!("pass SOURCE and DEST, or --job NAME"),
    }
}

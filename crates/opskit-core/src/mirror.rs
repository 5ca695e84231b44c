//! rsync-based directory mirroring with preflight checks.
//!
//! The preflights exist for one scenario above all: an external backup disk
//! that is not mounted. Without the marker check, rsync would happily fill
//! the empty mountpoint on the root filesystem.

use crate::error::{OpsError, Result};
use crate::exec::{self, Cmd, CmdOutput};
use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One mirror preset. Paths may start with `~/`; `marker` is a filename that
/// must exist inside `dest` before anything is copied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorJob {
    pub source: String,
    pub dest: String,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub delete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl MirrorJob {
    /// Ad-hoc job from command-line `SRC DEST` arguments.
    pub fn adhoc(source: &str, dest: &str) -> Self {
        MirrorJob {
            source: source.to_string(),
            dest: dest.to_string(),
            excludes: Vec::new(),
            delete: false,
            marker: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Preflight
// ---------------------------------------------------------------------------

/// Resolve and verify the job's paths before spawning rsync.
pub fn preflight(job: &MirrorJob) -> Result<(PathBuf, PathBuf)> {
    let source = paths::expand_tilde(&job.source)?;
    if !source.exists() {
        return Err(OpsError::SourceMissing(source));
    }

    let dest = paths::expand_tilde(&job.dest)?;
    let parent = dest.parent().unwrap_or(Path::new("/"));
    if !parent.exists() {
        return Err(OpsError::DestinationParentMissing(parent.to_path_buf()));
    }

    if let Some(marker) = &job.marker {
        let marker_path = dest.join(marker);
        if !marker_path.exists() {
            return Err(OpsError::MarkerMissing(marker_path));
        }
    }

    Ok((source, dest))
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// Build the rsync invocation. The source gets a trailing slash so rsync
/// copies its contents into `dest` rather than nesting a directory.
pub fn rsync_cmd(source: &Path, dest: &Path, job: &MirrorJob, dry_run: bool) -> Cmd {
    let mut cmd = Cmd::new("rsync").arg("-aHAX").arg("--info=stats2");
    if job.delete {
        cmd = cmd.arg("--delete");
    }
    if dry_run {
        cmd = cmd.arg("--dry-run");
    }
    for exclude in &job.excludes {
        cmd = cmd.arg(format!("--exclude={exclude}"));
    }
    let src = source.to_string_lossy();
    cmd.arg(format!("{}/", src.trim_end_matches('/')))
        .arg(dest.to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters pulled from rsync's `--info=stats2` summary. Fields stay `None`
/// when the corresponding line is absent or unparseable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RsyncStats {
    pub files_total: Option<u64>,
    pub files_transferred: Option<u64>,
    pub bytes_sent: Option<u64>,
}

pub fn parse_stats(output: &str) -> RsyncStats {
    fn grab(re: &Regex, output: &str) -> Option<u64> {
        let caps = re.captures(output)?;
        caps.get(1)?.as_str().replace(',', "").parse().ok()
    }

    let files = Regex::new(r"(?m)^Number of files: ([\d,]+)").unwrap();
    let transferred = Regex::new(r"(?m)^Number of regular files transferred: ([\d,]+)").unwrap();
    let sent = Regex::new(r"(?m)^Total bytes sent: ([\d,]+)").unwrap();

    RsyncStats {
        files_total: grab(&files, output),
        files_transferred: grab(&transferred, output),
        bytes_sent: grab(&sent, output),
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MirrorOutcome {
    pub stats: RsyncStats,
    /// Exit code 24: some source files vanished mid-transfer. The copy is
    /// otherwise complete.
    pub vanished_warning: bool,
}

pub fn run(job: &MirrorJob, dry_run: bool) -> Result<MirrorOutcome> {
    let (source, dest) = preflight(job)?;
    exec::require("rsync")?;
    let cmd = rsync_cmd(&source, &dest, job, dry_run);
    tracing::info!(source = %source.display(), dest = %dest.display(), "starting rsync");
    let output = cmd.output()?;
    interpret(&cmd, &output)
}

/// Map an rsync exit into an outcome: 0 is success, 24 is success with a
/// vanished-files warning, anything else is a failure.
fn interpret(cmd: &Cmd, output: &CmdOutput) -> Result<MirrorOutcome> {
    match output.code {
        0 | 24 => Ok(MirrorOutcome {
            stats: parse_stats(&output.stdout),
            vanished_warning: output.code == 24,
        }),
        code => Err(OpsError::CommandFailed {
            cmd: cmd.display(),
            code,
            stderr: exec::stderr_tail(&output.stderr),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STATS2_FIXTURE: &str = "\
Number of files: 12,345 (reg: 11,000, dir: 1,345)
Number of created files: 3
Number of deleted files: 0
Number of regular files transferred: 42
Total file size: 9,876,543,210 bytes
Total transferred file size: 1,234 bytes
Total bytes sent: 567,890
Total bytes received: 1,024
";

    #[test]
    fn preflight_rejects_missing_source() {
        let dir = TempDir::new().unwrap();
        let job = MirrorJob::adhoc(
            &dir.path().join("missing").to_string_lossy(),
            &dir.path().join("dest").to_string_lossy(),
        );
        assert!(matches!(preflight(&job), Err(OpsError::SourceMissing(_))));
    }

    #[test]
    fn preflight_rejects_missing_dest_parent() {
        let dir = TempDir::new().unwrap();
        let job = MirrorJob::adhoc(
            &dir.path().to_string_lossy(),
            "/nonexistent/backups/home",
        );
        assert!(matches!(
            preflight(&job),
            Err(OpsError::DestinationParentMissing(_))
        ));
    }

    #[test]
    fn preflight_requires_marker_when_set() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&dest).unwrap();

        let mut job = MirrorJob::adhoc(&src.to_string_lossy(), &dest.to_string_lossy());
        job.marker = Some(".backup-volume".into());
        assert!(matches!(preflight(&job), Err(OpsError::MarkerMissing(_))));

        std::fs::write(dest.join(".backup-volume"), b"").unwrap();
        let (s, d) = preflight(&job).unwrap();
        assert_eq!(s, src);
        assert_eq!(d, dest);
    }

    #[test]
    fn preflight_allows_missing_dest_itself() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let dest = dir.path().join("dest");

        let job = MirrorJob::adhoc(&src.to_string_lossy(), &dest.to_string_lossy());
        assert!(preflight(&job).is_ok());
    }

    #[test]
    fn rsync_cmd_builds_expected_argv() {
        let mut job = MirrorJob::adhoc("/home/me", "/mnt/backup/home");
        job.delete = true;
        job.excludes = vec![".cache".into(), "Downloads".into()];

        let cmd = rsync_cmd(Path::new("/home/me"), Path::new("/mnt/backup/home"), &job, false);
        assert_eq!(
            cmd.argv_as(false),
            vec![
                "rsync",
                "-aHAX",
                "--info=stats2",
                "--delete",
                "--exclude=.cache",
                "--exclude=Downloads",
                "/home/me/",
                "/mnt/backup/home",
            ]
        );
    }

    #[test]
    fn rsync_cmd_passes_dry_run_through() {
        let job = MirrorJob::adhoc("/a", "/b");
        let cmd = rsync_cmd(Path::new("/a"), Path::new("/b"), &job, true);
        assert!(cmd.argv_as(false).contains(&"--dry-run".to_string()));
    }

    #[test]
    fn source_slash_is_not_doubled() {
        let job = MirrorJob::adhoc("/a/", "/b");
        let cmd = rsync_cmd(Path::new("/a/"), Path::new("/b"), &job, false);
        assert!(cmd.argv_as(false).contains(&"/a/".to_string()));
    }

    #[test]
    fn stats_parse_strips_commas() {
        let stats = parse_stats(STATS2_FIXTURE);
        assert_eq!(stats.files_total, Some(12_345));
        assert_eq!(stats.files_transferred, Some(42));
        assert_eq!(stats.bytes_sent, Some(567_890));
    }

    #[test]
    fn stats_parse_tolerates_missing_lines() {
        let stats = parse_stats("sent 1 bytes  received 2 bytes\n");
        assert!(stats.files_total.is_none());
        assert!(stats.bytes_sent.is_none());
    }

    #[test]
    fn exit_zero_and_24_are_success() {
        let cmd = Cmd::new("rsync");
        let ok = CmdOutput {
            code: 0,
            stdout: STATS2_FIXTURE.to_string(),
            stderr: String::new(),
        };
        let outcome = interpret(&cmd, &ok).unwrap();
        assert!(!outcome.vanished_warning);
        assert_eq!(outcome.stats.files_transferred, Some(42));

        let vanished = CmdOutput {
            code: 24,
            stdout: STATS2_FIXTURE.to_string(),
            stderr: "file has vanished\n".to_string(),
        };
        assert!(interpret(&cmd, &vanished).unwrap().vanished_warning);
    }

    #[test]
    fn other_exit_codes_fail() {
        let cmd = Cmd::new("rsync");
        let out = CmdOutput {
            code: 23,
            stdout: String::new(),
            stderr: "rsync: permission denied\n".to_string(),
        };
        let err = interpret(&cmd, &out).unwrap_err();
        assert!(matches!(err, OpsError::CommandFailed { code: 23, .. }));
        assert!(err.to_string().contains("permission denied"));
    }
}

use crate::error::{OpsError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Project-level layout (per target project)
// ---------------------------------------------------------------------------

pub const OPSKIT_DIR: &str = ".opskit";
pub const WORKFLOW_FILE: &str = ".opskit/workflow.yaml";
pub const LOGS_DIR: &str = ".opskit/logs";
pub const REPORTS_DIR: &str = ".opskit/reports";

// ---------------------------------------------------------------------------
// Global layout (~/.config/opskit)
// ---------------------------------------------------------------------------

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const TUNE_PROFILE_NAME: &str = "tune.yaml";
pub const TUNE_BACKUP_NAME: &str = "tune-backup.yaml";

/// Path sysctl settings are persisted to by `tune apply`.
pub const SYSCTL_CONF_PATH: &str = "/etc/sysctl.d/99-opskit.conf";

/// Default path the firewall ruleset is written to.
pub const NFT_RULESET_PATH: &str = "/etc/opskit-nftables.conf";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn opskit_dir(root: &Path) -> PathBuf {
    root.join(OPSKIT_DIR)
}

pub fn workflow_path(root: &Path) -> PathBuf {
    root.join(WORKFLOW_FILE)
}

pub fn logs_dir(root: &Path) -> PathBuf {
    root.join(LOGS_DIR)
}

pub fn reports_dir(root: &Path) -> PathBuf {
    root.join(REPORTS_DIR)
}

pub fn report_path(root: &Path, step: &str) -> PathBuf {
    reports_dir(root).join(format!("{step}.md"))
}

pub fn home_dir() -> Result<PathBuf> {
    home::home_dir().ok_or(OpsError::HomeNotFound)
}

pub fn config_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".config/opskit"))
}

pub fn global_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

pub fn tune_profile_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(TUNE_PROFILE_NAME))
}

pub fn tune_backup_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(TUNE_BACKUP_NAME))
}

/// Expand a leading `~` or `~/` to the user's home directory.
/// Paths without a tilde pass through unchanged.
pub fn expand_tilde(path: &str) -> Result<PathBuf> {
    if path == "~" {
        return home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(PathBuf::from(path))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! System tuning: sysctl keys, systemd units, packages and an optional
//! nftables ruleset, driven by a YAML profile.
//!
//! The flow is probe → plan → execute. Probing reads live system state
//! (`/proc/sys`, `systemctl is-enabled`, `dpkg-query`), planning is a pure
//! diff against the profile, and execution runs the planned commands through
//! [`crate::exec::Cmd`]. `--dry-run` stops after planning.

use crate::error::Result;
use crate::exec::{self, Cmd};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Profile model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneProfile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_sysctl")]
    pub sysctl: BTreeMap<String, String>,
    #[serde(default)]
    pub services: ServicesSection,
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,
    #[serde(default)]
    pub firewall: FirewallSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesSection {
    #[serde(default = "default_disable_units")]
    pub disable: Vec<String>,
    #[serde(default = "default_enable_units")]
    pub enable: Vec<String>,
    #[serde(default)]
    pub mask: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ruleset")]
    pub ruleset: String,
    #[serde(default = "default_ruleset_path")]
    pub path: String,
}

fn default_version() -> u32 {
    1
}

fn default_sysctl() -> BTreeMap<String, String> {
    [
        ("vm.swappiness", "10"),
        ("vm.vfs_cache_pressure", "50"),
        ("fs.inotify.max_user_watches", "524288"),
        ("net.core.default_qdisc", "fq"),
        ("net.ipv4.tcp_congestion_control", "bbr"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_disable_units() -> Vec<String> {
    ["cups-browsed.service", "avahi-daemon.service", "ModemManager.service"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_enable_units() -> Vec<String> {
    vec!["fstrim.timer".to_string()]
}

fn default_packages() -> Vec<String> {
    ["curl", "git", "htop", "tmux", "unzip"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_ruleset() -> String {
    "\
flush ruleset

table inet filter {
    chain input {
        type filter hook input priority 0; policy drop;
        ct state established,related accept
        iif \"lo\" accept
        ip protocol icmp accept
        ip6 nexthdr icmpv6 accept
    }
    chain forward {
        type filter hook forward priority 0; policy drop;
    }
    chain output {
        type filter hook output priority 0; policy accept;
    }
}
"
    .to_string()
}

fn default_ruleset_path() -> String {
    paths::NFT_RULESET_PATH.to_string()
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            disable: default_disable_units(),
            enable: default_enable_units(),
            mask: Vec::new(),
        }
    }
}

impl Default for FirewallSection {
    fn default() -> Self {
        Self {
            enabled: false,
            ruleset: default_ruleset(),
            path: default_ruleset_path(),
        }
    }
}

impl Default for TuneProfile {
    fn default() -> Self {
        Self {
            version: 1,
            sysctl: default_sysctl(),
            services: ServicesSection::default(),
            packages: default_packages(),
            firewall: FirewallSection::default(),
        }
    }
}

impl TuneProfile {
    /// Load from an explicit profile file (must exist).
    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let profile: TuneProfile = serde_yaml::from_str(&data)?;
        Ok(profile)
    }

    /// Load `~/.config/opskit/tune.yaml`, falling back to built-in defaults
    /// when it doesn't exist.
    pub fn load_default() -> Result<Self> {
        let path = paths::tune_profile_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default profile to `path` unless it already exists.
    /// Returns true if the file was written.
    pub fn init(path: &Path) -> Result<bool> {
        let data = serde_yaml::to_string(&Self::default())?;
        crate::io::write_if_missing(path, data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftState {
    InSync,
    Differs,
    /// The probe tool is missing or the key/unit doesn't exist here.
    Unknown,
}

impl DriftState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftState::InSync => "in_sync",
            DriftState::Differs => "differs",
            DriftState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SysctlStatus {
    pub key: String,
    pub desired: String,
    pub current: Option<String>,
    pub state: DriftState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    Disable,
    Enable,
    Mask,
}

impl ServiceAction {
    pub fn desired_state(&self) -> &'static str {
        match self {
            ServiceAction::Disable => "disabled",
            ServiceAction::Enable => "enabled",
            ServiceAction::Mask => "masked",
        }
    }

    fn systemctl_args(&self) -> &'static [&'static str] {
        match self {
            ServiceAction::Disable => &["disable", "--now"],
            ServiceAction::Enable => &["enable", "--now"],
            ServiceAction::Mask => &["mask"],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub unit: String,
    pub action: ServiceAction,
    pub current: Option<String>,
    pub state: DriftState,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageStatus {
    pub package: String,
    /// `None` when `dpkg-query` is not available.
    pub installed: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TuneStatus {
    pub sysctl: Vec<SysctlStatus>,
    pub services: Vec<ServiceStatus>,
    pub packages: Vec<PackageStatus>,
}

/// `vm.swappiness` → `/proc/sys/vm/swappiness`.
pub fn sysctl_proc_path(key: &str) -> PathBuf {
    let mut p = PathBuf::from("/proc/sys");
    for part in key.split('.') {
        p.push(part);
    }
    p
}

/// Current value of a sysctl key, read from `/proc/sys`.
pub fn read_sysctl(key: &str) -> Option<String> {
    std::fs::read_to_string(sysctl_proc_path(key))
        .ok()
        .map(|v| normalize_value(&v))
}

/// Collapse whitespace so multi-column values (`32768\t60999`) compare
/// stably against profile strings.
fn normalize_value(v: &str) -> String {
    v.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First line of `systemctl is-enabled` output. The command exits non-zero
/// for `disabled`/`masked` units, so only an empty stdout means the unit
/// state could not be read.
fn parse_is_enabled(stdout: &str) -> Option<String> {
    let line = stdout.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Enablement state of a systemd unit, `None` when it can't be determined.
pub fn probe_unit(unit: &str) -> Option<String> {
    if !exec::available("systemctl") {
        return None;
    }
    let out = Cmd::new("systemctl").args(["is-enabled", unit]).output().ok()?;
    parse_is_enabled(&out.stdout)
}

/// Whether an apt package is installed, `None` when `dpkg-query` is missing.
pub fn package_installed(package: &str) -> Option<bool> {
    if !exec::available("dpkg-query") {
        return None;
    }
    let out = Cmd::new("dpkg-query")
        .args(["-W", "-f=${Package}\\n", package])
        .output()
        .ok()?;
    Some(out.success() && !out.stdout.trim().is_empty())
}

fn drift(desired: &str, current: &Option<String>) -> DriftState {
    match current {
        None => DriftState::Unknown,
        Some(c) if c == desired => DriftState::InSync,
        Some(_) => DriftState::Differs,
    }
}

/// Probe the live system against `profile`. Never mutates anything.
pub fn status(profile: &TuneProfile) -> TuneStatus {
    let sysctl = profile
        .sysctl
        .iter()
        .map(|(key, desired)| {
            let current = read_sysctl(key);
            SysctlStatus {
                state: drift(desired, &current),
                key: key.clone(),
                desired: desired.clone(),
                current,
            }
        })
        .collect();

    let mut services = Vec::new();
    for (action, units) in [
        (ServiceAction::Disable, &profile.services.disable),
        (ServiceAction::Enable, &profile.services.enable),
        (ServiceAction::Mask, &profile.services.mask),
    ] {
        for unit in units {
            let current = probe_unit(unit);
            services.push(ServiceStatus {
                state: drift(action.desired_state(), &current),
                unit: unit.clone(),
                action,
                current,
            });
        }
    }

    let packages = profile
        .packages
        .iter()
        .map(|p| PackageStatus {
            package: p.clone(),
            installed: package_installed(p),
        })
        .collect();

    TuneStatus {
        sysctl,
        services,
        packages,
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// One planned mutation: what to run plus a human label for reporting.
#[derive(Debug, Clone)]
pub struct PlannedCmd {
    pub label: String,
    pub cmd: Cmd,
}

/// Everything planning needs from the live system, separated out so the
/// diff itself stays pure.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    pub status: TuneStatus,
    /// Current content of the persisted sysctl conf, if readable.
    pub sysctl_conf: Option<String>,
    /// Current content of the firewall ruleset file, if readable.
    pub firewall_conf: Option<String>,
}

pub fn snapshot(profile: &TuneProfile) -> SystemSnapshot {
    SystemSnapshot {
        status: status(profile),
        sysctl_conf: std::fs::read_to_string(paths::SYSCTL_CONF_PATH).ok(),
        firewall_conf: std::fs::read_to_string(&profile.firewall.path).ok(),
    }
}

/// Rendered content of `/etc/sysctl.d/99-opskit.conf` for this profile.
pub fn render_sysctl_conf(profile: &TuneProfile) -> String {
    let mut out = String::from("# Managed by opskit tune. Edits are overwritten on apply.\n");
    for (key, value) in &profile.sysctl {
        out.push_str(&format!("{key} = {value}\n"));
    }
    out
}

/// Diff the profile against a snapshot. Only keys and units that differ
/// produce commands; `Unknown` probes are left alone.
pub fn plan(profile: &TuneProfile, snap: &SystemSnapshot) -> Vec<PlannedCmd> {
    let mut planned = Vec::new();

    for s in &snap.status.sysctl {
        if s.state == DriftState::Differs {
            planned.push(PlannedCmd {
                label: format!("sysctl {} = {}", s.key, s.desired),
                cmd: Cmd::new("sysctl")
                    .arg("-w")
                    .arg(format!("{}={}", s.key, s.desired))
                    .needs_root(),
            });
        }
    }

    let desired_conf = render_sysctl_conf(profile);
    if snap.sysctl_conf.as_deref() != Some(desired_conf.as_str()) {
        planned.push(PlannedCmd {
            label: format!("persist sysctl settings to {}", paths::SYSCTL_CONF_PATH),
            cmd: Cmd::new("tee")
                .arg(paths::SYSCTL_CONF_PATH)
                .needs_root()
                .with_stdin(desired_conf),
        });
    }

    for s in &snap.status.services {
        if s.state == DriftState::Differs {
            planned.push(PlannedCmd {
                label: format!("{} {}", s.action.desired_state(), s.unit),
                cmd: Cmd::new("systemctl")
                    .args(s.action.systemctl_args().iter().copied())
                    .arg(&s.unit)
                    .needs_root(),
            });
        }
    }

    if profile.firewall.enabled {
        if snap.firewall_conf.as_deref() != Some(profile.firewall.ruleset.as_str()) {
            planned.push(PlannedCmd {
                label: format!("write firewall ruleset to {}", profile.firewall.path),
                cmd: Cmd::new("tee")
                    .arg(&profile.firewall.path)
                    .needs_root()
                    .with_stdin(profile.firewall.ruleset.clone()),
            });
        }
        planned.push(PlannedCmd {
            label: "load firewall ruleset".to_string(),
            cmd: Cmd::new("nft").arg("-f").arg(&profile.firewall.path).needs_root(),
        });
    }

    planned
}

/// `apt-get update` + `apt-get install -y` for the given packages.
pub fn setup_plan(missing: &[String]) -> Vec<PlannedCmd> {
    if missing.is_empty() {
        return Vec::new();
    }
    let mut planned = vec![PlannedCmd {
        label: "refresh package lists".to_string(),
        cmd: Cmd::new("apt-get").arg("update").needs_root(),
    }];
    planned.push(PlannedCmd {
        label: format!("install {} package(s)", missing.len()),
        cmd: Cmd::new("apt-get")
            .args(["install", "-y"])
            .args(missing.iter().cloned())
            .needs_root(),
    });
    planned
}

// ---------------------------------------------------------------------------
// Backup / revert
// ---------------------------------------------------------------------------

/// Pre-apply snapshot of sysctl values, enabling `tune revert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneBackup {
    #[serde(default = "default_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub sysctl: BTreeMap<String, String>,
}

/// Write a backup of the currently readable sysctl values, unless a backup
/// already exists (the first apply wins; later applies must not clobber the
/// true pre-tune state). Returns true if written now.
pub fn write_backup(path: &Path, status: &TuneStatus) -> Result<bool> {
    let backup = TuneBackup {
        version: 1,
        created_at: Utc::now(),
        sysctl: status
            .sysctl
            .iter()
            .filter_map(|s| s.current.clone().map(|v| (s.key.clone(), v)))
            .collect(),
    };
    let data = serde_yaml::to_string(&backup)?;
    crate::io::write_if_missing(path, data.as_bytes())
}

pub fn load_backup(path: &Path) -> Result<Option<TuneBackup>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let backup: TuneBackup = serde_yaml::from_str(&data)?;
    Ok(Some(backup))
}

/// Commands that restore the backed-up sysctl values and drop the persisted
/// conf file.
pub fn revert_plan(backup: &TuneBackup, conf_exists: bool) -> Vec<PlannedCmd> {
    let mut planned: Vec<PlannedCmd> = backup
        .sysctl
        .iter()
        .map(|(key, value)| PlannedCmd {
            label: format!("restore {} = {}", key, value),
            cmd: Cmd::new("sysctl")
                .arg("-w")
                .arg(format!("{key}={value}"))
                .needs_root(),
        })
        .collect();

    if conf_exists {
        planned.push(PlannedCmd {
            label: format!("remove {}", paths::SYSCTL_CONF_PATH),
            cmd: Cmd::new("rm").arg(paths::SYSCTL_CONF_PATH).needs_root(),
        });
    }

    planned
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! External-tool health check. Every subsystem shells out somewhere; this
//! is the one place that lists all of those somewheres.

use serde::Serialize;
use std::path::PathBuf;

pub struct Requirement {
    pub binary: &'static str,
    pub subsystem: &'static str,
}

/// Binaries the subcommands reach for, in display order. `claude` is the
/// only one the core workflow cannot do without.
pub const REQUIREMENTS: [Requirement; 11] = [
    Requirement { binary: "claude", subsystem: "workflow" },
    Requirement { binary: "rsync", subsystem: "mirror" },
    Requirement { binary: "apt-get", subsystem: "tune, maintain" },
    Requirement { binary: "dpkg-query", subsystem: "tune" },
    Requirement { binary: "sysctl", subsystem: "tune" },
    Requirement { binary: "systemctl", subsystem: "tune" },
    Requirement { binary: "nft", subsystem: "tune (firewall)" },
    Requirement { binary: "docker", subsystem: "maintain" },
    Requirement { binary: "sqlite3", subsystem: "maintain" },
    Requirement { binary: "journalctl", subsystem: "maintain" },
    Requirement { binary: "sudo", subsystem: "tune, maintain" },
];

#[derive(Debug, Clone, Serialize)]
pub struct Probe {
    pub binary: String,
    pub subsystem: String,
    /// Resolved path, `None` when the binary is not on PATH.
    pub path: Option<PathBuf>,
}

impl Probe {
    pub fn found(&self) -> bool {
        self.path.is_some()
    }
}

pub fn probe_all() -> Vec<Probe> {
    REQUIREMENTS
        .iter()
        .map(|req| Probe {
            binary: req.binary.to_string(),
            subsystem: req.subsystem.to_string(),
            path: which::which(req.binary).ok(),
        })
        .collect()
}

/// Missing binaries that `--strict` should fail on. Everything except
/// `claude` degrades to a skipped task or a typed error at use time.
pub fn missing_core(probes: &[Probe]) -> Vec<&Probe> {
    probes
        .iter()
        .filter(|p| p.binary == "claude" && !p.found())
        .collect()
}

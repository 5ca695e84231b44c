//! Broken desktop-launcher detection.
//!
//! A launcher is broken when the program it points at is gone: an absolute
//! `Exec`/`TryExec` path that no longer exists, or a bare command name that
//! no longer resolves on `PATH`.

use crate::error::Result;
use crate::exec;
use crate::paths;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// The fields we care about from the `[Desktop Entry]` group.
#[derive(Debug, Clone, Default)]
pub struct DesktopEntry {
    pub path: PathBuf,
    pub name: String,
    pub entry_type: Option<String>,
    pub exec: Option<String>,
    pub try_exec: Option<String>,
    pub no_display: bool,
}

/// Parse the `[Desktop Entry]` group of a launcher file. Other groups
/// (desktop actions) and localized keys are ignored.
pub fn parse_entry(path: &Path, text: &str) -> DesktopEntry {
    let mut entry = DesktopEntry {
        path: path.to_path_buf(),
        name: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        ..DesktopEntry::default()
    };

    let mut in_main_group = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            in_main_group = line == "[Desktop Entry]";
            continue;
        }
        if !in_main_group {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "Type" => entry.entry_type = Some(value.trim().to_string()),
            "Name" => entry.name = value.trim().to_string(),
            "Exec" => entry.exec = Some(value.trim().to_string()),
            "TryExec" => entry.try_exec = Some(value.trim().to_string()),
            "NoDisplay" => entry.no_display = value.trim() == "true",
            _ => {}
        }
    }
    entry
}

/// First program word of an `Exec` line: double quotes group words, `\`
/// escapes inside quotes, field-code tokens (`%f`, `%U`, ...) are skipped.
pub fn first_exec_word(exec: &str) -> Option<String> {
    let mut chars = exec.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        chars.peek()?;

        let mut word = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            word.push(escaped);
                        }
                    }
                    _ => word.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }

        if !word.starts_with('%') && !word.is_empty() {
            return Some(word);
        }
    }
}

// ---------------------------------------------------------------------------
// Checking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokenReason {
    /// Absolute path does not exist.
    MissingPath,
    /// Bare command name does not resolve on PATH.
    NotOnPath,
}

impl std::fmt::Display for BrokenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokenReason::MissingPath => f.write_str("path missing"),
            BrokenReason::NotOnPath => f.write_str("not on PATH"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokenShortcut {
    pub path: PathBuf,
    pub name: String,
    pub target: String,
    pub reason: BrokenReason,
}

/// Decide whether a launcher is broken. `TryExec` wins over `Exec` when both
/// are set. Non-application entries and `NoDisplay=true` entries are never
/// flagged: a NoDisplay file usually masks a system launcher on purpose.
pub fn check(entry: &DesktopEntry) -> Option<BrokenShortcut> {
    if entry.entry_type.as_deref() != Some("Application") || entry.no_display {
        return None;
    }
    let target = match &entry.try_exec {
        Some(t) if !t.is_empty() => t.clone(),
        _ => first_exec_word(entry.exec.as_deref()?)?,
    };

    let reason = if target.starts_with('/') {
        if Path::new(&target).exists() {
            return None;
        }
        BrokenReason::MissingPath
    } else if target.contains('/') {
        // Relative path with directories; too ambiguous to judge.
        return None;
    } else {
        if exec::available(&target) {
            return None;
        }
        BrokenReason::NotOnPath
    };

    Some(BrokenShortcut {
        path: entry.path.clone(),
        name: entry.name.clone(),
        target,
        reason,
    })
}

// ---------------------------------------------------------------------------
// Scan and clean
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub broken: Vec<BrokenShortcut>,
}

pub fn default_scan_dir() -> Result<PathBuf> {
    Ok(paths::home_dir()?.join(".local/share/applications"))
}

/// Walk the given directories for `.desktop` files and collect broken
/// launchers. Missing directories are skipped; unreadable files are logged
/// and skipped.
pub fn scan_dirs(dirs: &[PathBuf]) -> Result<ScanReport> {
    let mut report = ScanReport {
        scanned: 0,
        broken: Vec::new(),
    };
    for dir in dirs {
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "scan dir missing, skipping");
            continue;
        }
        for item in WalkDir::new(dir).follow_links(false) {
            let item = item.map_err(std::io::Error::from)?;
            let path = item.path();
            if !item.file_type().is_file()
                || path.extension().is_none_or(|e| e != "desktop")
            {
                continue;
            }
            let text = match std::fs::read_to_string(path) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(file = %path.display(), "unreadable launcher: {e}");
                    continue;
                }
            };
            report.scanned += 1;
            if let Some(broken) = check(&parse_entry(path, &text)) {
                report.broken.push(broken);
            }
        }
    }
    report.broken.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(report)
}

/// Delete broken launcher files. Returns the paths actually removed; in
/// dry-run mode nothing is touched and the full list comes back.
pub fn clean(broken: &[BrokenShortcut], dry_run: bool) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for shortcut in broken {
        if !dry_run {
            std::fs::remove_file(&shortcut.path)?;
            tracing::info!(file = %shortcut.path.display(), "removed broken launcher");
        }
        removed.push(shortcut.path.clone());
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

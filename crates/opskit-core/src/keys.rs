//! Secret comparison that never prints the secret.
//!
//! Instead of the raw value, reports carry length, a SHA-256 fingerprint
//! prefix, and a heavily masked preview. Good enough to answer "is the key
//! in my shell the same one as in the .env file" without leaking either.

use crate::error::{OpsError, Result};
use crate::paths;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where a secret comes from: `env:VAR`, `file:PATH` (first line), or the
/// argument itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Literal(String),
    Env(String),
    File(PathBuf),
}

pub fn parse_source(spec: &str) -> Result<KeySource> {
    if let Some(var) = spec.strip_prefix("env:") {
        if var.is_empty() {
            return Err(OpsError::InvalidKeySource(spec.to_string()));
        }
        return Ok(KeySource::Env(var.to_string()));
    }
    if let Some(path) = spec.strip_prefix("file:") {
        if path.is_empty() {
            return Err(OpsError::InvalidKeySource(spec.to_string()));
        }
        return Ok(KeySource::File(PathBuf::from(path)));
    }
    Ok(KeySource::Literal(spec.to_string()))
}

pub fn resolve(source: &KeySource) -> Result<String> {
    match source {
        KeySource::Literal(value) => Ok(value.clone()),
        KeySource::Env(var) => {
            std::env::var(var).map_err(|_| OpsError::EnvVarMissing(var.clone()))
        }
        KeySource::File(path) => {
            let path = paths::expand_tilde(&path.to_string_lossy())?;
            let text = std::fs::read_to_string(&path)?;
            match text.lines().next() {
                Some(line) if !line.trim().is_empty() => Ok(line.to_string()),
                _ => Err(OpsError::EmptyFile(path)),
            }
        }
    }
}

/// Strip surrounding whitespace and one matching pair of quotes. `.env`
/// files and shell exports wrap values both ways.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = if trimmed.len() >= 2 {
        let bytes = trimmed.as_bytes();
        let first = bytes[0];
        let last = bytes[trimmed.len() - 1];
        if first == last && (first == b'"' || first == b'\'') {
            &trimmed[1..trimmed.len() - 1]
        } else {
            trimmed
        }
    } else {
        trimmed
    };
    unquoted.trim().to_string()
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// First 16 hex chars of the SHA-256 digest.
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// `abcd…wxyz` for long values; all stars for 8 chars or fewer.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Byte index of the first difference, `None` when equal.
pub fn first_diff(a: &str, b: &str) -> Option<usize> {
    if a == b {
        return None;
    }
    let position = a
        .bytes()
        .zip(b.bytes())
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.len().min(b.len()));
    Some(position)
}

#[derive(Debug, Clone, Serialize)]
pub struct SideReport {
    pub length: usize,
    pub fingerprint: String,
    pub preview: String,
}

impl SideReport {
    fn of(value: &str) -> Self {
        SideReport {
            length: value.len(),
            fingerprint: fingerprint(value),
            preview: mask(value),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyReport {
    pub equal: bool,
    pub left: SideReport,
    pub right: SideReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_diff: Option<usize>,
}

/// Resolve, normalize and compare two secrets.
pub fn compare(left: &KeySource, right: &KeySource) -> Result<KeyReport> {
    let left_value = normalize(&resolve(left)?);
    let right_value = normalize(&resolve(right)?);
    let diff = first_diff(&left_value, &right_value);
    Ok(KeyReport {
        equal: diff.is_none(),
        left: SideReport::of(&left_value),
        right: SideReport::of(&right_value),
        first_diff: diff,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn source_parsing() {
        assert_eq!(
            parse_source("sk-abc").unwrap(),
            KeySource::Literal("sk-abc".into())
        );
        assert_eq!(
            parse_source("env:API_KEY").unwrap(),
            KeySource::Env("API_KEY".into())
        );
        assert_eq!(
            parse_source("file:~/.secrets/key").unwrap(),
            KeySource::File(PathBuf::from("~/.secrets/key"))
        );
        assert!(matches!(
            parse_source("env:"),
            Err(OpsError::InvalidKeySource(_))
        ));
        assert!(matches!(
            parse_source("file:"),
            Err(OpsError::InvalidKeySource(_))
        ));
    }

    #[test]
    fn env_resolution() {
        std::env::set_var("OPSKIT_TEST_KEY_RESOLVE", "from-env");
        let value = resolve(&KeySource::Env("OPSKIT_TEST_KEY_RESOLVE".into())).unwrap();
        assert_eq!(value, "from-env");

        assert!(matches!(
            resolve(&KeySource::Env("OPSKIT_TEST_KEY_UNSET_XYZ".into())),
            Err(OpsError::EnvVarMissing(_))
        ));
    }

    #[test]
    fn file_resolution_takes_first_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "sk-first-line\nsecond line\n").unwrap();
        let value = resolve(&KeySource::File(path.clone())).unwrap();
        assert_eq!(value, "sk-first-line");

        std::fs::write(&path, "\n\n").unwrap();
        assert!(matches!(
            resolve(&KeySource::File(path)),
            Err(OpsError::EmptyFile(_))
        ));
    }

    #[test]
    fn normalization_strips_whitespace_and_quotes() {
        assert_eq!(normalize("  sk-abc  "), "sk-abc");
        assert_eq!(normalize("\"sk-abc\""), "sk-abc");
        assert_eq!(normalize("'sk-abc'"), "sk-abc");
        assert_eq!(normalize("  \"sk-abc\"\n"), "sk-abc");
        // Mismatched quotes stay.
        assert_eq!(normalize("\"sk-abc'"), "\"sk-abc'");
        assert_eq!(normalize("'"), "'");
    }

    #[test]
    fn fingerprint_is_sha256_prefix() {
        // sha256("abc") starts with ba7816bf8f01cfea.
        assert_eq!(fingerprint("abc"), "ba7816bf8f01cfea");
        assert_eq!(fingerprint("abc").len(), 16);
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }

    #[test]
    fn mask_never_shows_short_values() {
        assert_eq!(mask("12345678"), "********");
        assert_eq!(mask("abc"), "***");
        assert_eq!(mask(""), "");
        assert_eq!(mask("sk-ant-api-key-12345"), "sk-a…2345");
        assert_eq!(mask("123456789"), "1234…6789");
    }

    #[test]
    fn first_diff_positions() {
        assert_eq!(first_diff("same", "same"), None);
        assert_eq!(first_diff("abcx", "abcy"), Some(3));
        assert_eq!(first_diff("abc", "abcdef"), Some(3));
        assert_eq!(first_diff("", "x"), Some(0));
    }

    #[test]
    fn compare_equal_after_normalization() {
        let report = compare(
            &KeySource::Literal("\"sk-test-123456\"".into()),
            &KeySource::Literal("  sk-test-123456 ".into()),
        )
        .unwrap();
        assert!(report.equal);
        assert!(report.first_diff.is_none());
        assert_eq!(report.left.fingerprint, report.right.fingerprint);
        assert_eq!(report.left.preview, "sk-t…3456");
    }

    #[test]
    fn compare_reports_divergence_without_leaking() {
        let report = compare(
            &KeySource::Literal("sk-test-123456".into()),
            &KeySource::Literal("sk-test-123457".into()),
        )
        .unwrap();
        assert!(!report.equal);
        assert_eq!(report.first_diff, Some(13));
        assert_ne!(report.left.fingerprint, report.right.fingerprint);
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("sk-test-123456"));
    }
}

use std::path::{Path, PathBuf};

/// Resolve the project directory for workflow commands.
///
/// Priority:
/// 1. Explicit PATH argument
/// 2. Walk upward from `cwd` looking for `.opskit/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_project(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    for needle in [".opskit", ".git"] {
        let mut dir = cwd.clone();
        loop {
            if dir.join(needle).is_dir() {
                return dir;
            }
            match dir.parent() {
                Some(p) => dir = p.to_path_buf(),
                None => break,
            }
        }
    }

    cwd
}

//! `tree`-style directory listings.
//!
//! Directories sort before files, both alphabetically. Pruned directories
//! (build output, vendored deps) are shown but never entered.

use crate::error::{OpsError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

/// Directory names that are listed but not descended into.
pub const DEFAULT_PRUNE: [&str; 5] = [".git", "node_modules", "target", "__pycache__", ".venv"];

#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    /// Directory levels to descend; `None` means unlimited.
    pub max_depth: Option<usize>,
    pub show_hidden: bool,
    /// Extra directory names to prune on top of [`DEFAULT_PRUNE`].
    pub prune: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeListing {
    pub text: String,
    pub dirs: usize,
    pub files: usize,
}

pub fn generate(root: &Path, opts: &TreeOptions) -> Result<TreeListing> {
    if !root.is_dir() {
        return Err(OpsError::NotADirectory(root.to_path_buf()));
    }

    let mut prune: HashSet<String> = DEFAULT_PRUNE.iter().map(|s| s.to_string()).collect();
    prune.extend(opts.prune.iter().cloned());

    let mut text = format!("{}\n", root.display());
    let mut dirs = 0;
    let mut files = 0;
    walk(
        root,
        "",
        opts.max_depth,
        opts.show_hidden,
        &prune,
        &mut text,
        &mut dirs,
        &mut files,
    )?;
    text.push_str(&format!("\n{dirs} directories, {files} files\n"));

    Ok(TreeListing { text, dirs, files })
}

#[allow(clippy::too_many_arguments)]
fn walk(
    dir: &Path,
    prefix: &str,
    levels_left: Option<usize>,
    show_hidden: bool,
    prune: &HashSet<String>,
    out: &mut String,
    dirs: &mut usize,
    files: &mut usize,
) -> Result<()> {
    if levels_left == Some(0) {
        return Ok(());
    }

    let mut entries: Vec<(String, bool)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !show_hidden && name.starts_with('.') {
            continue;
        }
        // Symlinks are listed as leaves; following them risks cycles.
        let is_dir = entry.file_type()?.is_dir();
        entries.push((name, is_dir));
    }
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let count = entries.len();
    for (i, (name, is_dir)) in entries.into_iter().enumerate() {
        let last = i + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(&name);
        out.push('\n');

        if is_dir {
            *dirs += 1;
            if !prune.contains(&name) {
                let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
                walk(
                    &dir.join(&name),
                    &child_prefix,
                    levels_left.map(|d| d - 1),
                    show_hidden,
                    prune,
                    out,
                    dirs,
                    files,
                )?;
            }
        } else {
            *files += 1;
        }
    }
    Ok(())
}

/// Wrap a listing in a fenced code block for embedding in Markdown.
pub fn render_markdown(listing: &TreeListing) -> String {
    format!("```\n{}```\n", listing.text)
}

/// Write the listing to a file, fenced when the target is Markdown.
pub fn save(listing: &TreeListing, path: &Path) -> Result<()> {
    let body = if path.extension().is_some_and(|e| e == "md") {
        render_markdown(listing)
    } else {
        listing.text.clone()
    };
    crate::io::atomic_write(path, body.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use crate::output;
use anyhow::{Context, Result};
use opskit_core::tree::{self, TreeOptions};
use std::path::Path;

pub fn run(
    path: Option<&Path>,
    depth: Option<usize>,
    hidden: bool,
    prune: Vec<String>,
    output_file: Option<&Path>,
    json: bool,
) -> Result<()> {
    let root = path.unwrap_or(Path::new("."));
    let opts = TreeOptions {
        max_depth: depth,
        show_hidden: hidden,
        prune,
    };
    let listing = tree::generate(root, &opts)
        .with_context(|| format!("failed to walk {}", root.display()))?;

    if let Some(file) = output_file {
        tree::save(&listing, file)
            .with_context(|| format!("failed to write {}", file.display()))?;
        println!(
            "Wrote {} ({} directories, {} files).",
            file.display(),
            listing.dirs,
            listing.files
        );
        return Ok(());
    }

    if json {
        return output::print_json(&listing);
    }
    print!("{}", listing.text);
    Ok(())
}

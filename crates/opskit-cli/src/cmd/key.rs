use crate::output;
use anyhow::{Context, Result};
use opskit_core::keys;

#[derive(clap::Subcommand)]
pub enum KeySubcommand {
    /// Compare two secrets. Each side is a literal, `env:VAR`, or
    /// `file:PATH` (first line). Exit code 1 when they differ.
    Compare {
        /// Left-hand secret
        left: String,

        /// Right-hand secret
        right: String,
    },
}

pub fn run(subcommand: KeySubcommand, json: bool) -> Result<()> {
    let KeySubcommand::Compare { left, right } = subcommand;

    let left = keys::parse_source(&left).context("invalid left-hand source")?;
    let right = keys::parse_source(&right).context("invalid right-hand source")?;
    let report = keys::compare(&left, &right).context("comparison failed")?;

    if json {
        output::print_json(&report)?;
    } else {
        let rows = vec![
            side_row("left", &report.left),
            side_row("right", &report.right),
        ];
        output::print_table(&["SIDE", "LENGTH", "FINGERPRINT", "PREVIEW"], rows);
        if report.equal {
            println!("\nKeys match.");
        } else {
            match report.first_diff {
                Some(i) => println!("\nKeys differ (first difference at byte {i})."),
                None => println!("\nKeys differ."),
            }
        }
    }

    if !report.equal {
        std::process::exit(1);
    }
    Ok(())
}

fn side_row(side: &str, report: &keys::SideReport) -> Vec<String> {
    vec![
        side.to_string(),
        report.length.to_string(),
        report.fingerprint.clone(),
        report.preview.clone(),
    ]
}

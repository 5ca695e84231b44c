mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    key::KeySubcommand, shortcuts::ShortcutsSubcommand, tune::TuneSubcommand,
    workflow::WorkflowSubcommand,
};
use opskit_core::maintain::Task;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "opskit",
    about = "Workstation operations toolbox — AI project workflows, system tuning, and maintenance",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the five-step AI workflow (review → refactor → optimize → document → test)
    Workflow {
        #[command(subcommand)]
        subcommand: WorkflowSubcommand,
    },

    /// Inspect and apply the system tuning profile
    Tune {
        #[command(subcommand)]
        subcommand: TuneSubcommand,
    },

    /// Install the tuning profile's missing apt packages
    Setup {
        /// Profile file (default: ~/.config/opskit/tune.yaml)
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run cleanup tasks: apt, journal, docker, sqlite
    Maintain {
        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,

        /// Skip a task (repeatable)
        #[arg(long, value_parser = cmd::maintain::parse_task)]
        skip: Vec<Task>,
    },

    /// Find and remove desktop launchers whose program is gone
    Shortcuts {
        #[command(subcommand)]
        subcommand: ShortcutsSubcommand,
    },

    /// Mirror a directory with rsync
    Mirror {
        /// Source directory (ad-hoc mode)
        #[arg(requires = "dest", conflicts_with = "job")]
        source: Option<String>,

        /// Destination directory (ad-hoc mode)
        #[arg(conflicts_with = "job")]
        dest: Option<String>,

        /// Use a named job from the config file
        #[arg(long)]
        job: Option<String>,

        /// Delete destination files missing from the source
        #[arg(long)]
        delete: bool,

        /// Exclude pattern, passed to rsync (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Pass --dry-run through to rsync
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a tree-style directory listing
    Tree {
        /// Directory to list (default: current directory)
        path: Option<PathBuf>,

        /// Directory levels to descend
        #[arg(long)]
        depth: Option<usize>,

        /// Include hidden entries
        #[arg(long)]
        hidden: bool,

        /// Extra directory names to prune (repeatable)
        #[arg(long)]
        prune: Vec<String>,

        /// Write the listing to a file (fenced when it ends in .md)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare secrets without printing them
    Key {
        #[command(subcommand)]
        subcommand: KeySubcommand,
    },

    /// Check which external tools the subcommands can find
    Doctor {
        /// Exit non-zero when the claude binary is missing
        #[arg(long)]
        strict: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Workflow {
            subcommand: WorkflowSubcommand::Run { .. },
        }
        | Commands::Tune {
            subcommand: TuneSubcommand::Apply { .. } | TuneSubcommand::Revert { .. },
        }
        | Commands::Setup { .. }
        | Commands::Maintain { .. }
        | Commands::Shortcuts {
            subcommand: ShortcutsSubcommand::Clean { .. },
        }
        | Commands::Mirror { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Workflow { subcommand } => cmd::workflow::run(subcommand, cli.json),
        Commands::Tune { subcommand } => cmd::tune::run(subcommand, cli.json),
        Commands::Setup { profile, dry_run } => {
            cmd::tune::setup(profile.as_deref(), dry_run, cli.json)
        }
        Commands::Maintain { dry_run, skip } => cmd::maintain::run(dry_run, &skip, cli.json),
        Commands::Shortcuts { subcommand } => cmd::shortcuts::run(subcommand, cli.json),
        Commands::Mirror {
            source,
            dest,
            job,
            delete,
            exclude,
            dry_run,
        } => cmd::mirror::run(
            source.as_deref(),
            dest.as_deref(),
            job.as_deref(),
            delete,
            exclude,
            dry_run,
            cli.json,
        ),
        Commands::Tree {
            path,
            depth,
            hidden,
            prune,
            output,
        } => cmd::tree::run(path.as_deref(), depth, hidden, prune, output.as_deref(), cli.json),
        Commands::Key { subcommand } => cmd::key::run(subcommand, cli.json),
        Commands::Doctor { strict } => cmd::doctor::run(strict, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// dgnsync - incremental design file synchronization
#[derive(Parser, Debug)]
#[command(name = "dgnsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: <first source dir>/<stem>.syncinfo.db)
    #[arg(long, global = true, env = "DGNSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert source files into a new store (everything is inserted)
    Convert {
        #[command(flatten)]
        run: RunArgs,

        /// Overwrite an existing store
        #[arg(long)]
        force: bool,
    },

    /// Synchronize changed source files into an existing store
    Update(RunArgs),

    /// Show store contents and the last run
    Status,

    /// Print normalized content hashes of a source file's elements
    Hash {
        /// Source snapshot (.json)
        source: PathBuf,

        /// Only this element id
        #[arg(long)]
        element: Option<u64>,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments shared by `convert` and `update`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Source snapshots (.json), one per design file
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Job configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Remove stored files that are not among the sources
    #[arg(long)]
    pub detect_deleted_files: bool,
}

/// Supported shells for completions.
#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "quota",
    about = "Hierarchical storage quota accounting",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log engine activity at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Recompute statistics for a snapshot and show per-node usage
    Usage(UsageArgs),
    /// Replay host changes and lifecycle events against a snapshot
    Replay(ReplayArgs),
}

#[derive(Args)]
pub struct UsageArgs {
    /// Snapshot file (.json or .toml)
    pub snapshot: PathBuf,
    /// Engine configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Only list nodes over their limit
    #[arg(long)]
    pub over_limit: bool,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Snapshot file (.json or .toml)
    pub snapshot: PathBuf,
    /// JSON array of host changes and lifecycle events
    pub events: PathBuf,
    /// Engine configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Rebuild statistics from content sizes before replaying
    #[arg(long)]
    pub recompute: bool,
    /// Write the resulting snapshot here (.json or .toml)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

//! Command-line interface definitions.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the identity reset engine.
#[derive(Parser, Debug)]
#[command(
    name = "idreset",
    about = "Regenerate an application's per-installation telemetry identifiers",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options accepted by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Settings file (defaults to ~/.config/idreset/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reset the telemetry and OS identifiers
    Reset(ResetOpts),
    /// Print a freshly generated identifier set as JSON
    Generate,
    /// Print version information
    Version,
}

/// Options for the `reset` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct ResetOpts {
    /// Seconds to wait for running instances to exit
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Gate on this version instead of reading package.json
    #[arg(long, value_name = "X.Y.Z")]
    pub assume_version: Option<String>,

    /// Fail the legacy patch when no accessor pattern matches
    #[arg(long)]
    pub strict_patch: bool,

    /// Abort when running instances do not exit before the timeout
    #[arg(long)]
    pub require_termination: bool,

    /// Override the application data directory
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Override the application install directory
    #[arg(long, value_name = "PATH")]
    pub install_dir: Option<PathBuf>,
}

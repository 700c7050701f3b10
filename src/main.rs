//! Command-line entry point for idreset.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use idreset_cli::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    match args.command {
        cli::Command::Reset(opts) => {
            logging::init_subscriber(args.verbose, "reset");
            let log = Arc::new(logging::Logger::new("reset"));
            commands::reset::run(&args.global, &opts, &log)
        }
        cli::Command::Generate => commands::generate::run(),
        cli::Command::Version => commands::version::run(),
    }
}

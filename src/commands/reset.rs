//! Command: reset the telemetry and OS identifiers.
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::CommandSetup;
use crate::cli::{GlobalOpts, ResetOpts};
use crate::logging::Logger;
use crate::reset::{ResetContext, ResetOrchestrator, ResetReport};

/// Run the reset command.
///
/// # Errors
///
/// Returns an error if setup fails or the orchestrator ends in `Failed`.
pub fn run(global: &GlobalOpts, opts: &ResetOpts, log: &Arc<Logger>) -> Result<()> {
    log.info(&format!("idreset {}", super::version::version()));

    let setup = CommandSetup::init(global, opts, log)?;
    let ctx = ResetContext::new(
        Arc::new(setup.settings),
        setup.platform,
        setup.profile,
        log.clone(),
        global.dry_run,
    )
    .with_assumed_version(opts.assume_version.clone());

    run_with(&ctx, log)
}

/// Drive the orchestrator over a prepared context and print the summary.
///
/// # Errors
///
/// Returns the orchestrator's failure wrapped with the state it ended in.
pub fn run_with(ctx: &ResetContext, log: &Logger) -> Result<()> {
    let mut orchestrator = ResetOrchestrator::new(ctx);
    let result = orchestrator.run();
    if let Ok(report) = &result {
        report_identities(report, ctx.dry_run, log);
    }
    log.print_summary();
    result
        .map(|_| ())
        .with_context(|| format!("reset ended in state {}", orchestrator.state()))
}

fn report_identities(report: &ResetReport, dry_run: bool, log: &Logger) {
    let Some(ids) = &report.identities else {
        return;
    };
    log.stage(if dry_run {
        "Identifiers (not written)"
    } else {
        "New identifiers"
    });
    for (key, value) in ids.entries() {
        log.info(&format!("{key} = {value}"));
    }
}

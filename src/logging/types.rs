//! Core logging types: step entries, status, and the [`Log`] trait.

/// Result of one orchestration step, kept for the end-of-run summary.
#[derive(Debug, Clone)]
pub struct StepEntry {
    /// Human-readable step name.
    pub name: String,
    /// Final status of the step.
    pub status: StepStatus,
    /// Optional detail (skip reason, error description).
    pub message: Option<String>,
}

/// Status of a completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Step completed successfully.
    Ok,
    /// Step did nothing because it does not apply (missing file, other strategy).
    Skipped,
    /// Step ran in dry-run mode; no changes were applied.
    DryRun,
    /// Step completed but a soft error was logged.
    Warned,
    /// Step failed and aborted the reset.
    Failed,
}

/// Abstraction over logging backends.
///
/// Engine code logs through `&dyn Log` so tests can substitute a recorder
/// for the console/file [`Logger`](super::logger::Logger).
pub trait Log: Send + Sync + std::fmt::Debug {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Relay one line of output from the trusted reset script.
    fn script_output(&self, line: &str);
    /// Record a step result for the summary.
    fn record_step(&self, name: &str, status: StepStatus, message: Option<&str>);
}

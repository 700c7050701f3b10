//! Command: print version information.
use std::io::{self, Write as _};

use anyhow::{Context as _, Result};

/// Version string baked in at build time, else the crate version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("IDRESET_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the idreset version to stdout.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn run() -> Result<()> {
    writeln!(io::stdout().lock(), "idreset {}", version()).context("writing to stdout")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_never_empty() {
        assert!(!version().trim().is_empty());
    }

    #[test]
    fn run_writes_to_stdout() {
        assert!(run().is_ok());
    }
}

//! Command: print a freshly generated identifier set.
use std::io::{self, Write as _};

use anyhow::{Context as _, Result};

use crate::resources::identity::{MacIdStyle, TelemetryIdentitySet};

/// `macMachineId` format used by the host OS.
#[must_use]
pub const fn native_style() -> MacIdStyle {
    if cfg!(windows) {
        MacIdStyle::GuidTemplate
    } else {
        MacIdStyle::Hex64
    }
}

/// Render `ids` as the JSON fragment the config store would receive.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render(ids: &TelemetryIdentitySet) -> Result<String> {
    serde_json::to_string_pretty(ids).context("serializing identifier set")
}

/// Generate a new set and print it to stdout. Touches nothing on disk.
///
/// # Errors
///
/// Returns an error if serialization fails or stdout cannot be written.
pub fn run() -> Result<()> {
    let ids = TelemetryIdentitySet::generate(native_style());
    let rendered = render(&ids)?;
    writeln!(io::stdout().lock(), "{rendered}").context("writing to stdout")
}

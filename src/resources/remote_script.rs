//! Trusted external script used for the macOS reset.
//!
//! The script runs with full privileges, so the fetch sits behind its own
//! [`TrustedScriptSource`] seam and every run logs the script's digest.
use std::fmt::Write as _;

use super::{Applicable, ResourceChange};
use crate::error::{ResetError, Result};
use crate::exec::{Executor, OutputStream};
use crate::logging::Log;

/// Provider of the script text.
#[cfg_attr(test, mockall::automock)]
pub trait TrustedScriptSource: Send + Sync + std::fmt::Debug {
    /// Where the script comes from, for logging.
    fn origin(&self) -> String;

    /// Fetch the complete script.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::Download`] if the script cannot be retrieved.
    fn fetch(&self) -> Result<String>;
}

/// Fetches the script over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpScriptSource {
    url: String,
}

impl HttpScriptSource {
    /// Create a source for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl TrustedScriptSource for HttpScriptSource {
    fn origin(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> Result<String> {
        let download_error = |e: ureq::Error| ResetError::Download {
            url: self.url.clone(),
            reason: e.to_string(),
        };
        let mut response = ureq::get(&self.url).call().map_err(download_error)?;
        response.body_mut().read_to_string().map_err(download_error)
    }
}

/// Lowercase hex SHA-256 of `text`.
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut hex = String::with_capacity(64);
    for b in &digest {
        // write! to a String is infallible.
        write!(hex, "{b:02x}").unwrap_or(());
    }
    hex
}

/// Runs the trusted script through `bash`, via `sudo` when not root.
#[derive(Debug)]
pub struct RemoteScriptResource<'a> {
    source: &'a dyn TrustedScriptSource,
    executor: &'a dyn Executor,
    elevated: bool,
    log: &'a dyn Log,
}

impl<'a> RemoteScriptResource<'a> {
    /// Create the resource.
    #[must_use]
    pub fn new(
        source: &'a dyn TrustedScriptSource,
        executor: &'a dyn Executor,
        elevated: bool,
        log: &'a dyn Log,
    ) -> Self {
        Self {
            source,
            executor,
            elevated,
            log,
        }
    }
}

impl Applicable for RemoteScriptResource<'_> {
    fn description(&self) -> String {
        format!("trusted script {}", self.source.origin())
    }

    fn apply(&self) -> Result<ResourceChange> {
        let script = self.source.fetch()?;
        self.log.info(&format!(
            "running script from {} (sha256 {}, {} bytes)",
            self.source.origin(),
            sha256_hex(&script),
            script.len()
        ));

        let (program, args): (&str, &[&str]) = if self.elevated {
            ("bash", &["-s"])
        } else {
            ("sudo", &["bash", "-s"])
        };
        let log = self.log;
        let mut on_line = |stream: OutputStream, line: &str| {
            if line.trim().is_empty() {
                return;
            }
            match stream {
                OutputStream::Stdout => log.script_output(line),
                OutputStream::Stderr => log.error(line),
            }
        };
        let result = self
            .executor
            .run_with_input(program, args, script.as_bytes(), &mut on_line)
            .map_err(|e| ResetError::Command {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        if !result.success {
            return Err(ResetError::Command {
                program: "bash".to_string(),
                reason: format!(
                    "script exited with status {}",
                    result.code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
                ),
            });
        }
        Ok(ResourceChange::Applied)
    }
}

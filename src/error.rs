//! Domain-specific error types for the identity reset engine.
//!
//! Engine modules return [`ResetError`] so callers must handle both paths
//! explicitly, while command handlers at the CLI boundary convert them to
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Severity
//!
//! ```text
//! ResetError
//! ├── UnsupportedPlatform        hard
//! ├── Environment                hard
//! ├── MissingArtifact            hard (machine-id absence never reaches here)
//! ├── PermissionDenied           hard, carries a remediation hint
//! ├── VersionParse               soft, recovered by the version gate
//! ├── PatchPatternMismatch       soft unless strict patching is enabled
//! ├── VerificationMismatch       hard
//! ├── ProcessTerminationTimeout  soft unless termination is required
//! ├── InvalidTransition          hard, orchestrator misuse
//! └── Io / Json / Command / Pattern / Download: hard plumbing failures
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::reset::ResetState;

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, ResetError>;

/// Errors raised by the identity reset engine.
#[derive(Error, Debug)]
pub enum ResetError {
    /// The host operating system has no platform profile.
    #[error("unsupported platform: {platform}")]
    UnsupportedPlatform {
        /// Name of the detected operating system.
        platform: String,
    },

    /// A required environment variable is not set.
    #[error("environment variable {var} is not set")]
    Environment {
        /// Name of the variable.
        var: String,
    },

    /// A required artifact (config store, install file) does not exist.
    #[error("missing artifact: {}", .path.display())]
    MissingArtifact {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// Elevation is required for the operation but the process lacks it.
    #[error("permission denied: {target} ({remediation})")]
    PermissionDenied {
        /// File, registry key, or operation that was refused.
        target: String,
        /// What the user should do to fix it.
        remediation: String,
    },

    /// An installed version string is not dotted-decimal `X.Y.Z`.
    #[error("invalid version string '{input}'")]
    VersionParse {
        /// The rejected input.
        input: String,
    },

    /// Neither legacy accessor pattern matched the target source file.
    #[error("no accessor pattern matched in {}", .path.display())]
    PatchPatternMismatch {
        /// Source file that was scanned.
        path: PathBuf,
    },

    /// A value read back after a write differs from what was written.
    #[error("verification failed for {target}: expected {expected}, got {actual}")]
    VerificationMismatch {
        /// What was being verified (e.g. a registry value path).
        target: String,
        /// Value that was written.
        expected: String,
        /// Value that was read back.
        actual: String,
    },

    /// Target processes were still running when the wait timed out.
    #[error("processes still running after timeout: {}", format_pids(.remaining))]
    ProcessTerminationTimeout {
        /// Process identifiers that were asked to exit.
        signalled: Vec<u32>,
        /// Process identifiers that did not exit.
        remaining: Vec<u32>,
    },

    /// The orchestrator was asked to leave a terminal state.
    #[error("no transition out of state {from}")]
    InvalidTransition {
        /// State the orchestrator was in.
        from: ResetState,
    },

    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A JSON document could not be serialized or deserialized.
    #[error("JSON error in {}: {source}", .path.display())]
    Json {
        /// Path of the document.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },

    /// An external command could not be run or exited non-zero.
    #[error("command '{program}' failed: {reason}")]
    Command {
        /// Program that was invoked.
        program: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A built-in source pattern failed to compile.
    #[error("invalid accessor pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A remote resource could not be fetched.
    #[error("download of {url} failed: {reason}")]
    Download {
        /// URL that was requested.
        url: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

impl ResetError {
    /// Build an [`ResetError::Io`], mapping `PermissionDenied` I/O errors to
    /// [`ResetError::PermissionDenied`] with an elevation hint.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied {
                target: path.display().to_string(),
                remediation: elevation_hint().to_string(),
            };
        }
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the orchestrator may log this error and continue.
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::VersionParse { .. }
                | Self::PatchPatternMismatch { .. }
                | Self::ProcessTerminationTimeout { .. }
        )
    }
}

/// Platform-appropriate advice for acquiring elevated privileges.
#[must_use]
pub const fn elevation_hint() -> &'static str {
    if cfg!(windows) {
        "re-run from an elevated prompt (Run as administrator)"
    } else {
        "re-run as root or with sudo"
    }
}

fn format_pids(pids: &[u32]) -> String {
    pids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn unsupported_platform_display() {
        let e = ResetError::UnsupportedPlatform {
            platform: "freebsd".to_string(),
        };
        assert_eq!(e.to_string(), "unsupported platform: freebsd");
    }

    #[test]
    fn permission_denied_display_includes_remediation() {
        let e = ResetError::PermissionDenied {
            target: "/etc/machine-id".to_string(),
            remediation: "re-run as root or with sudo".to_string(),
        };
        insta::assert_snapshot!(
            e.to_string(),
            @"permission denied: /etc/machine-id (re-run as root or with sudo)"
        );
    }

    #[test]
    fn verification_mismatch_display() {
        let e = ResetError::VerificationMismatch {
            target: "MachineGuid".to_string(),
            expected: "aaa".to_string(),
            actual: "bbb".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "verification failed for MachineGuid: expected aaa, got bbb"
        );
    }

    #[test]
    fn termination_timeout_lists_pids() {
        let e = ResetError::ProcessTerminationTimeout {
            signalled: vec![12, 34, 56],
            remaining: vec![12, 34],
        };
        assert_eq!(
            e.to_string(),
            "processes still running after timeout: 12, 34"
        );
    }

    #[test]
    fn io_maps_permission_denied() {
        let e = ResetError::io(
            "/etc/machine-id",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(e, ResetError::PermissionDenied { .. }));
        assert!(e.to_string().contains("/etc/machine-id"));
    }

    #[test]
    fn io_keeps_other_kinds() {
        let e = ResetError::io("/tmp/x", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(e, ResetError::Io { .. }));
    }

    #[test]
    fn io_error_has_source() {
        use std::error::Error as StdError;
        let e = ResetError::io("/tmp/x", io::Error::other("boom"));
        assert!(e.source().is_some());
    }

    #[test]
    fn soft_errors() {
        assert!(ResetError::VersionParse { input: "x".into() }.is_soft());
        assert!(
            ResetError::ProcessTerminationTimeout {
                signalled: vec![1],
                remaining: vec![1],
            }
            .is_soft()
        );
        assert!(
            ResetError::PatchPatternMismatch {
                path: PathBuf::from("main.js")
            }
            .is_soft()
        );
    }

    #[test]
    fn hard_errors() {
        assert!(
            !ResetError::VerificationMismatch {
                target: "t".into(),
                expected: "a".into(),
                actual: "b".into(),
            }
            .is_soft()
        );
        assert!(
            !ResetError::InvalidTransition {
                from: ResetState::Done
            }
            .is_soft()
        );
        assert!(
            !ResetError::MissingArtifact {
                path: PathBuf::from("storage.json")
            }
            .is_soft()
        );
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn reset_error_is_send_sync() {
        assert_send_sync::<ResetError>();
    }

    #[test]
    fn reset_error_converts_to_anyhow() {
        let e = ResetError::UnsupportedPlatform {
            platform: "plan9".to_string(),
        };
        let _anyhow_err: anyhow::Error = e.into();
    }
}

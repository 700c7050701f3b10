//! Mutation primitives used by the reset orchestrator.
//!
//! Each mutation target (config store, OS identity store, patched source,
//! trusted script) is an [`Applicable`] resource exposing the same
//! backup → apply → verify protocol.
pub mod backup;
pub mod config_store;
pub mod helpers;
pub mod identity;
pub mod legacy_patch;
pub mod machine_id;
pub mod process;
pub mod registry;
pub mod remote_script;

use crate::error::Result;

pub use backup::{BackupManager, BackupRecord};

/// A single mutation target driven through backup, apply, and verify.
pub trait Applicable: std::fmt::Debug {
    /// Human-readable description of this resource.
    fn description(&self) -> String;

    /// Snapshot the current state before mutation.
    ///
    /// Returns `None` when the resource has nothing to back up (absent file,
    /// no in-process state).
    ///
    /// # Errors
    ///
    /// Returns an error when a blocking backup fails; the caller must not
    /// proceed to [`apply`](Self::apply).
    fn backup(&self) -> Result<Option<BackupRecord>> {
        Ok(None)
    }

    /// Perform the mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation could not be completed.
    fn apply(&self) -> Result<ResourceChange>;

    /// Confirm the mutation took effect.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::VerificationMismatch`](crate::error::ResetError::VerificationMismatch)
    /// when the persisted state differs from what was written.
    fn verify(&self) -> Result<()> {
        Ok(())
    }
}

/// Result of applying a resource change.
///
/// # Examples
///
/// ```
/// use idreset_cli::resources::ResourceChange;
///
/// let applied = ResourceChange::Applied;
/// let skipped = ResourceChange::Skipped { reason: "file absent".into() };
///
/// assert_eq!(applied, ResourceChange::Applied);
/// assert_ne!(applied, skipped);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    /// Resource was updated.
    Applied,
    /// Resource already held the desired state.
    AlreadyCorrect,
    /// Resource was skipped.
    Skipped {
        /// Reason why the resource was skipped.
        reason: String,
    },
}

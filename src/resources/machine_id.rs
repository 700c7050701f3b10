//! Linux `/etc/machine-id` replacement.
use std::fs;
use std::path::PathBuf;

use super::helpers::fs::with_suffix;
use super::{Applicable, BackupManager, BackupRecord, ResourceChange};
use crate::error::{ResetError, Result, elevation_hint};
use crate::exec::Executor;
use crate::logging::Log;

/// The system machine-id file as an orchestrated resource.
///
/// Absence of the file is not an error; every step is skipped with a
/// warning. Without root the copy and write go through `sudo`.
#[derive(Debug)]
pub struct MachineIdResource<'a> {
    path: PathBuf,
    new_id: String,
    elevated: bool,
    executor: &'a dyn Executor,
    backups: &'a BackupManager,
    log: &'a dyn Log,
}

impl<'a> MachineIdResource<'a> {
    /// Create a resource that will write `new_id` to `path`.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        new_id: String,
        elevated: bool,
        executor: &'a dyn Executor,
        backups: &'a BackupManager,
        log: &'a dyn Log,
    ) -> Self {
        Self {
            path: path.into(),
            new_id,
            elevated,
            executor,
            backups,
            log,
        }
    }

    fn sibling_backup(&self) -> PathBuf {
        with_suffix(&self.path, ".backup")
    }

    fn write_direct(&self) -> Result<()> {
        let sibling = self.sibling_backup();
        fs::copy(&self.path, &sibling).map_err(|e| ResetError::io(&sibling, e))?;
        fs::write(&self.path, format!("{}\n", self.new_id))
            .map_err(|e| ResetError::io(&self.path, e))
    }

    fn write_via_sudo(&self) -> Result<()> {
        if !self.executor.which("sudo") {
            return Err(ResetError::PermissionDenied {
                target: self.path.display().to_string(),
                remediation: elevation_hint().to_string(),
            });
        }
        let path = self.path.to_string_lossy();
        let sibling = self.sibling_backup();
        let sibling = sibling.to_string_lossy();

        self.executor
            .run("sudo", &["cp", &path, &sibling])
            .map_err(|e| ResetError::Command {
                program: "sudo cp".to_string(),
                reason: e.to_string(),
            })?;

        let content = format!("{}\n", self.new_id);
        let result = self
            .executor
            .run_with_input("sudo", &["tee", &path], content.as_bytes(), &mut |_, _| {})
            .map_err(|e| ResetError::Command {
                program: "sudo tee".to_string(),
                reason: e.to_string(),
            })?;
        if !result.success {
            return Err(ResetError::Command {
                program: "sudo tee".to_string(),
                reason: result.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Applicable for MachineIdResource<'_> {
    fn description(&self) -> String {
        format!("machine id {}", self.path.display())
    }

    fn backup(&self) -> Result<Option<BackupRecord>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        self.backups.backup(&self.path).map(Some)
    }

    fn apply(&self) -> Result<ResourceChange> {
        if !self.path.is_file() {
            let reason = format!("{} not present", self.path.display());
            self.log.warn(&format!("skipping machine id update: {reason}"));
            return Ok(ResourceChange::Skipped { reason });
        }
        if self.elevated {
            self.write_direct()?;
        } else {
            self.log.debug("not running as root, writing machine id through sudo");
            self.write_via_sudo()?;
        }
        self.log.info(&format!(
            "{} updated (previous copy at {})",
            self.path.display(),
            self.sibling_backup().display()
        ));
        Ok(ResourceChange::Applied)
    }

    fn verify(&self) -> Result<()> {
        if !self.path.is_file() {
            return Ok(());
        }
        let actual = fs::read_to_string(&self.path).map_err(|e| ResetError::io(&self.path, e))?;
        if actual.trim_end() != self.new_id {
            return Err(ResetError::VerificationMismatch {
                target: self.path.display().to_string(),
                expected: self.new_id.clone(),
                actual: actual.trim_end().to_string(),
            });
        }
        Ok(())
    }
}

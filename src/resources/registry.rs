//! Windows `MachineGuid` update with export backup and write-then-verify.
use std::io;
use std::path::PathBuf;

use chrono::Local;

use super::backup::TIMESTAMP_FORMAT;
use super::helpers::fs::set_readonly;
use super::{Applicable, BackupRecord, ResourceChange};
use crate::error::{ResetError, Result, elevation_hint};
use crate::exec::Executor;
use crate::logging::Log;
use crate::platform::CRYPTOGRAPHY_SUBKEY;

/// Registry value holding the machine GUID.
pub const MACHINE_GUID_VALUE: &str = "MachineGuid";

/// Access to the `MachineGuid` value.
#[cfg_attr(test, mockall::automock)]
pub trait GuidStore: Send + Sync + std::fmt::Debug {
    /// Open the key read-only and return the current value.
    ///
    /// # Errors
    ///
    /// Returns the underlying registry error.
    fn read(&self) -> io::Result<String>;

    /// Open the key for writing and store `value`.
    ///
    /// # Errors
    ///
    /// Returns the underlying registry error; `PermissionDenied` when not
    /// running as administrator.
    fn write(&self, value: &str) -> io::Result<()>;
}

/// [`GuidStore`] over `HKLM\SOFTWARE\Microsoft\Cryptography`.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct WinRegGuidStore;

#[cfg(windows)]
impl GuidStore for WinRegGuidStore {
    fn read(&self) -> io::Result<String> {
        use winreg::RegKey;
        use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ};
        RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey_with_flags(CRYPTOGRAPHY_SUBKEY, KEY_READ)?
            .get_value::<String, _>(MACHINE_GUID_VALUE)
    }

    fn write(&self, value: &str) -> io::Result<()> {
        use winreg::RegKey;
        use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE};
        RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey_with_flags(CRYPTOGRAPHY_SUBKEY, KEY_READ | KEY_WRITE)?
            .set_value(MACHINE_GUID_VALUE, &value.to_string())
    }
}

/// Store used when nothing is injected: the real registry on Windows.
#[must_use]
pub fn default_guid_store() -> Option<std::sync::Arc<dyn GuidStore>> {
    #[cfg(windows)]
    {
        Some(std::sync::Arc::new(WinRegGuidStore))
    }
    #[cfg(not(windows))]
    {
        None
    }
}

fn value_path() -> String {
    format!(r"HKEY_LOCAL_MACHINE\{CRYPTOGRAPHY_SUBKEY}\{MACHINE_GUID_VALUE}")
}

fn registry_error(e: io::Error) -> ResetError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        ResetError::PermissionDenied {
            target: value_path(),
            remediation: elevation_hint().to_string(),
        }
    } else {
        ResetError::Command {
            program: "registry".to_string(),
            reason: format!("{}: {e}", value_path()),
        }
    }
}

/// The registry machine GUID as an orchestrated resource.
#[derive(Debug)]
pub struct MachineGuidResource<'a> {
    store: &'a dyn GuidStore,
    executor: &'a dyn Executor,
    backup_dir: PathBuf,
    new_guid: String,
    log: &'a dyn Log,
}

impl<'a> MachineGuidResource<'a> {
    /// Create a resource that will set `MachineGuid` to `new_guid`.
    #[must_use]
    pub fn new(
        store: &'a dyn GuidStore,
        executor: &'a dyn Executor,
        backup_dir: impl Into<PathBuf>,
        new_guid: String,
        log: &'a dyn Log,
    ) -> Self {
        Self {
            store,
            executor,
            backup_dir: backup_dir.into(),
            new_guid,
            log,
        }
    }

    fn read_back(&self) -> Result<()> {
        let actual = self.store.read().map_err(registry_error)?;
        if actual != self.new_guid {
            return Err(ResetError::VerificationMismatch {
                target: value_path(),
                expected: self.new_guid.clone(),
                actual,
            });
        }
        Ok(())
    }
}

impl Applicable for MachineGuidResource<'_> {
    fn description(&self) -> String {
        value_path()
    }

    /// Export the key with `reg export`. Failure is logged and does not
    /// block the update.
    fn backup(&self) -> Result<Option<BackupRecord>> {
        match self.store.read() {
            Ok(current) => self.log.info(&format!("current MachineGuid: {current}")),
            Err(e) => self.log.warn(&format!("cannot read current MachineGuid: {e}")),
        }

        if let Err(e) = std::fs::create_dir_all(&self.backup_dir) {
            self.log.warn(&format!(
                "registry backup skipped, cannot create {}: {e}",
                self.backup_dir.display()
            ));
            return Ok(None);
        }

        let created_at = Local::now();
        let file = self.backup_dir.join(format!(
            "MachineGuid_{}.reg",
            created_at.format(TIMESTAMP_FORMAT)
        ));
        let key = format!(r"HKEY_LOCAL_MACHINE\{CRYPTOGRAPHY_SUBKEY}");
        let file_arg = file.to_string_lossy();
        let exported = self
            .executor
            .run_unchecked("reg", &["export", &key, &file_arg, "/y"]);

        match exported {
            Ok(r) if r.success => {
                if let Err(e) = set_readonly(&file) {
                    self.log.warn(&format!("cannot protect {}: {e}", file.display()));
                }
                self.log.info(&format!("registry exported to {}", file.display()));
                Ok(Some(BackupRecord {
                    original: PathBuf::from(value_path()),
                    backup: file,
                    created_at,
                }))
            }
            Ok(r) => {
                self.log.warn(&format!(
                    "registry export failed, continuing without backup: {}",
                    r.stderr.trim()
                ));
                Ok(None)
            }
            Err(e) => {
                self.log.warn(&format!(
                    "registry export failed, continuing without backup: {e}"
                ));
                Ok(None)
            }
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        self.store.write(&self.new_guid).map_err(registry_error)?;
        self.read_back()?;
        self.log.info(&format!("MachineGuid set to {}", self.new_guid));
        Ok(ResourceChange::Applied)
    }

    fn verify(&self) -> Result<()> {
        self.read_back()
    }
}

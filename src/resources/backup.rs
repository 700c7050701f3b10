//! Timestamped, read-only snapshots of files about to be mutated.
//!
//! Backups are never pruned.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::helpers::fs::{match_owner, set_readonly, with_suffix};
use crate::error::{ResetError, Result};

/// `strftime` pattern embedded in backup file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A completed backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// File that was backed up.
    pub original: PathBuf,
    /// Location of the read-only copy.
    pub backup: PathBuf,
    /// When the copy was taken.
    pub created_at: DateTime<Local>,
}

/// Copies artifacts into a backup directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
}

impl BackupManager {
    /// Create a manager writing into `backup_dir`.
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    /// Directory receiving backups.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copy `path` to `<backup_dir>/<name>.backup_<YYYYMMDD_HHMMSS>` and make
    /// the copy read-only. The copy takes the source's owner, and a newly
    /// created directory takes its parent's.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is missing, the directory cannot be
    /// created, or the copy fails. A failed copy leaves no file behind.
    pub fn backup(&self, path: &Path) -> Result<BackupRecord> {
        if !path.is_file() {
            return Err(ResetError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }
        if !self.backup_dir.is_dir() {
            fs::create_dir_all(&self.backup_dir)
                .map_err(|e| ResetError::io(&self.backup_dir, e))?;
            if let Some(parent_meta) = self.backup_dir.parent().and_then(|p| fs::metadata(p).ok())
            {
                // Ownership only differs when running elevated.
                match_owner(&self.backup_dir, &parent_meta).ok();
            }
        }

        let created_at = Local::now();
        let target = self.unique_name(path, &created_at);

        if let Err(e) = fs::copy(path, &target) {
            fs::remove_file(&target).ok();
            return Err(ResetError::io(&target, e));
        }
        if let Ok(source_meta) = fs::metadata(path) {
            match_owner(&target, &source_meta).ok();
        }
        set_readonly(&target)?;

        Ok(BackupRecord {
            original: path.to_path_buf(),
            backup: target,
            created_at,
        })
    }

    /// Backup name for `path`, suffixed `_1`, `_2`, … if taken.
    fn unique_name(&self, path: &Path, at: &DateTime<Local>) -> PathBuf {
        let file_name = path.file_name().unwrap_or_default();
        let base = with_suffix(
            &self.backup_dir.join(file_name),
            &format!(".backup_{}", at.format(TIMESTAMP_FORMAT)),
        );
        if !base.exists() {
            return base;
        }
        (1u32..)
            .map(|n| with_suffix(&base, &format!("_{n}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(base)
    }
}

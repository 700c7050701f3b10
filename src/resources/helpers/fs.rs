//! File-system helpers shared by the mutating resources.
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{ResetError, Result};

/// Temporary sibling used while rewriting `path`.
#[must_use]
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Append `suffix` to the file name of `path` (`main.js` → `main.js.old`).
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Write `contents` to a temporary sibling of `path`, flushed to disk.
///
/// The temporary file is removed again if writing fails.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created or written.
pub fn write_tmp(path: &Path, contents: &[u8]) -> Result<PathBuf> {
    let tmp = tmp_sibling(path);
    let written = fs::File::create(&tmp).and_then(|mut f| {
        f.write_all(contents)?;
        f.sync_all()
    });
    if let Err(e) = written {
        fs::remove_file(&tmp).ok();
        return Err(ResetError::io(&tmp, e));
    }
    Ok(tmp)
}

/// Replace `path` with `contents` through a temporary sibling and a rename,
/// so a failure never leaves `path` truncated.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or renamed over
/// `path`; the original file is unchanged in that case.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = write_tmp(path, contents)?;
    replace_with(&tmp, path)
}

/// Rename `tmp` over `path`, removing `tmp` on failure.
///
/// # Errors
///
/// Returns an error if the rename fails.
pub fn replace_with(tmp: &Path, path: &Path) -> Result<()> {
    // Windows refuses to replace a read-only destination.
    #[cfg(windows)]
    clear_readonly(path).ok();
    if let Err(e) = fs::rename(tmp, path) {
        fs::remove_file(tmp).ok();
        return Err(ResetError::io(path, e));
    }
    Ok(())
}

/// Give `path` the owner and group recorded in `meta`, so a run under
/// `sudo` leaves user files owned by the user. No-op when they already match.
///
/// # Errors
///
/// Returns the I/O error if `path` cannot be inspected or `chown` fails.
#[cfg(unix)]
pub fn match_owner(path: &Path, meta: &fs::Metadata) -> std::io::Result<()> {
    use std::os::unix::fs::MetadataExt as _;
    let current = fs::metadata(path)?;
    if current.uid() == meta.uid() && current.gid() == meta.gid() {
        return Ok(());
    }
    std::os::unix::fs::chown(path, Some(meta.uid()), Some(meta.gid()))
}

/// Ownership is not carried over outside Unix.
///
/// # Errors
///
/// Never fails.
#[cfg(not(unix))]
pub const fn match_owner(_path: &Path, _meta: &fs::Metadata) -> std::io::Result<()> {
    Ok(())
}

/// Mark `path` read-only (`0o444` on Unix, the read-only attribute elsewhere).
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed; a refusal due to
/// insufficient privilege maps to [`ResetError::PermissionDenied`].
pub fn set_readonly(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        fs::set_permissions(path, fs::Permissions::from_mode(0o444))
            .map_err(|e| ResetError::io(path, e))
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(path)
            .map_err(|e| ResetError::io(path, e))?
            .permissions();
        perms.set_readonly(true);
        fs::set_permissions(path, perms).map_err(|e| ResetError::io(path, e))
    }
}

/// Make `path` writable by its owner again. No-op if `path` is absent.
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
pub fn clear_readonly(path: &Path) -> Result<()> {
    let Ok(meta) = fs::metadata(path) else {
        return Ok(());
    };
    let mut perms = meta.permissions();
    if !perms.readonly() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms).map_err(|e| ResetError::io(path, e))
}

//! In-place patch of the application's main script for pre-0.45 installs.
//!
//! Two accessor bodies of the form
//! `async getMachineId(){return <cached>??<fallback>}` are rewritten to
//! return `<fallback>` unconditionally.
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use super::helpers::fs::{match_owner, replace_with, with_suffix, write_tmp};
use super::{Applicable, ResourceChange};
use crate::error::{ResetError, Result};
use crate::logging::Log;

/// `(pattern, replacement)` for each patched accessor.
const ACCESSORS: [(&str, &str); 2] = [
    (
        r"async getMachineId\(\)\{return [^?]+\?\?([^}]+)\}",
        "async getMachineId(){return ${1}}",
    ),
    (
        r"async getMacMachineId\(\)\{return [^?]+\?\?([^}]+)\}",
        "async getMacMachineId(){return ${1}}",
    ),
];

/// Compiled accessor substitutions.
#[derive(Debug, Clone)]
pub struct LegacyPatcher {
    rules: Vec<(Regex, &'static str)>,
}

/// Result of a completed patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Number of substitutions made across both accessors.
    pub substitutions: usize,
    /// Copy of the unpatched file.
    pub backup: PathBuf,
}

impl LegacyPatcher {
    /// Compile the accessor patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::Pattern`] if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        let rules = ACCESSORS
            .iter()
            .map(|(pattern, replacement)| -> Result<_> {
                Ok((Regex::new(pattern)?, *replacement))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Apply every substitution to `source`, returning the new text and the
    /// number of replacements made.
    #[must_use]
    pub fn patch_source(&self, source: &str) -> (String, usize) {
        let mut text = source.to_string();
        let mut count = 0;
        for (re, replacement) in &self.rules {
            count += re.find_iter(&text).count();
            text = re.replace_all(&text, *replacement).into_owned();
        }
        (text, count)
    }

    /// Whether any accessor in `source` still has a cached-value fallback.
    #[must_use]
    pub fn is_unpatched(&self, source: &str) -> bool {
        self.rules.iter().any(|(re, _)| re.is_match(source))
    }

    /// Patch `main_script` in place.
    ///
    /// The patched text goes to a temporary sibling first; then the original
    /// is copied to `<name>.old`, the temporary file is renamed over the
    /// original, and the original permission bits (and on Unix the owner)
    /// are restored. On failure before the rename the original is untouched
    /// and the temporary file is removed.
    ///
    /// With zero matches the file is rewritten unchanged unless `strict`,
    /// in which case [`ResetError::PatchPatternMismatch`] is returned and
    /// nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be read or replaced,
    /// or (with `strict`) no pattern matched.
    pub fn patch(&self, main_script: &Path, strict: bool, log: &dyn Log) -> Result<PatchOutcome> {
        if !main_script.is_file() {
            return Err(ResetError::MissingArtifact {
                path: main_script.to_path_buf(),
            });
        }
        let source =
            fs::read_to_string(main_script).map_err(|e| ResetError::io(main_script, e))?;
        let (patched, substitutions) = self.patch_source(&source);
        if substitutions == 0 {
            if strict {
                return Err(ResetError::PatchPatternMismatch {
                    path: main_script.to_path_buf(),
                });
            }
            log.warn(&format!(
                "no accessor pattern matched in {}, writing it back unchanged",
                main_script.display()
            ));
        }

        let meta = fs::metadata(main_script).map_err(|e| ResetError::io(main_script, e))?;
        let tmp = write_tmp(main_script, patched.as_bytes())?;
        let backup = with_suffix(main_script, ".old");
        if let Err(e) = fs::copy(main_script, &backup) {
            fs::remove_file(&tmp).ok();
            return Err(ResetError::io(&backup, e));
        }
        replace_with(&tmp, main_script)?;

        fs::set_permissions(main_script, meta.permissions())
            .map_err(|e| ResetError::io(main_script, e))?;
        restore_owner(main_script, &meta, log);

        log.debug(&format!(
            "{substitutions} substitution(s) in {}",
            main_script.display()
        ));
        Ok(PatchOutcome {
            substitutions,
            backup,
        })
    }
}

fn restore_owner(path: &Path, meta: &fs::Metadata, log: &dyn Log) {
    if let Err(e) = match_owner(path, meta) {
        log.warn(&format!("cannot restore owner of {}: {e}", path.display()));
    }
}

/// The legacy main-script patch as an orchestrated resource.
#[derive(Debug)]
pub struct LegacyPatchResource<'a> {
    patcher: LegacyPatcher,
    main_script: PathBuf,
    strict: bool,
    log: &'a dyn Log,
}

impl<'a> LegacyPatchResource<'a> {
    /// Create a resource patching `main_script`.
    ///
    /// # Errors
    ///
    /// Returns an error if the accessor patterns fail to compile.
    pub fn new(main_script: impl Into<PathBuf>, strict: bool, log: &'a dyn Log) -> Result<Self> {
        Ok(Self {
            patcher: LegacyPatcher::new()?,
            main_script: main_script.into(),
            strict,
            log,
        })
    }
}

impl Applicable for LegacyPatchResource<'_> {
    fn description(&self) -> String {
        format!("main script {}", self.main_script.display())
    }

    fn apply(&self) -> Result<ResourceChange> {
        let outcome = self.patcher.patch(&self.main_script, self.strict, self.log)?;
        self.log.info(&format!(
            "patched {} (original at {})",
            self.main_script.display(),
            outcome.backup.display()
        ));
        if outcome.substitutions == 0 {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        Ok(ResourceChange::Applied)
    }

    fn verify(&self) -> Result<()> {
        let text = fs::read_to_string(&self.main_script)
            .map_err(|e| ResetError::io(&self.main_script, e))?;
        if self.patcher.is_unpatched(&text) {
            return Err(ResetError::VerificationMismatch {
                target: self.main_script.display().to_string(),
                expected: "accessors without cached fallback".to_string(),
                actual: "cached fallback still present".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;

    const SOURCE: &str = "x=1;async getMachineId(){return this.cached??this.fresh()}\
        y=2;async getMacMachineId(){return await this.mac??crypto.randomUUID()}z=3;";

    #[test]
    fn patch_source_strips_fallback() {
        let patcher = LegacyPatcher::new().unwrap();
        let (out, n) = patcher.patch_source(SOURCE);
        assert_eq!(n, 2);
        insta::assert_snapshot!(out, @"x=1;async getMachineId(){return this.fresh()}y=2;async getMacMachineId(){return crypto.randomUUID()}z=3;");
        assert!(!patcher.is_unpatched(&out));
    }

    #[test]
    fn unrelated_text_is_byte_identical() {
        let patcher = LegacyPatcher::new().unwrap();
        let src = "function other(){return a??b}\n";
        let (out, n) = patcher.patch_source(src);
        assert_eq!(n, 0);
        assert_eq!(out, src);
    }

    #[test]
    fn patch_writes_old_copy_and_keeps_permissions() {
        let (log, _tmp, _guard) = isolated_logger();
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.js");
        fs::write(&main, SOURCE).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            fs::set_permissions(&main, fs::Permissions::from_mode(0o640)).unwrap();
        }

        let outcome = LegacyPatcher::new()
            .unwrap()
            .patch(&main, false, &log)
            .unwrap();

        assert_eq!(outcome.substitutions, 2);
        assert_eq!(fs::read_to_string(&outcome.backup).unwrap(), SOURCE);
        assert!(fs::read_to_string(&main).unwrap().contains("return this.fresh()}"));
        assert!(!dir.path().join("main.js.tmp").exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            let mode = fs::metadata(&main).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o640);
        }
    }

    #[test]
    fn zero_matches_writes_unchanged_by_default() {
        let (log, _tmp, _guard) = isolated_logger();
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.js");
        fs::write(&main, "nothing here").unwrap();

        let outcome = LegacyPatcher::new()
            .unwrap()
            .patch(&main, false, &log)
            .unwrap();
        assert_eq!(outcome.substitutions, 0);
        assert_eq!(fs::read_to_string(&main).unwrap(), "nothing here");
        assert!(outcome.backup.exists());
    }

    #[test]
    fn zero_matches_in_strict_mode_is_mismatch() {
        let (log, _tmp, _guard) = isolated_logger();
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.js");
        fs::write(&main, "nothing here").unwrap();

        let err = LegacyPatcher::new()
            .unwrap()
            .patch(&main, true, &log)
            .unwrap_err();
        assert!(matches!(err, ResetError::PatchPatternMismatch { .. }));
        assert!(!dir.path().join("main.js.old").exists());
        assert!(!dir.path().join("main.js.tmp").exists());
    }

    #[test]
    fn missing_script_is_missing_artifact() {
        let (log, _tmp, _guard) = isolated_logger();
        let dir = tempfile::tempdir().unwrap();
        let err = LegacyPatcher::new()
            .unwrap()
            .patch(&dir.path().join("main.js"), false, &log)
            .unwrap_err();
        assert!(matches!(err, ResetError::MissingArtifact { .. }));
    }

    #[test]
    fn resource_verify_after_apply() {
        let (log, _tmp, _guard) = isolated_logger();
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.js");
        fs::write(&main, SOURCE).unwrap();
        let res = LegacyPatchResource::new(&main, false, &log).unwrap();
        assert!(res.verify().is_err());
        assert_eq!(res.apply().unwrap(), ResourceChange::Applied);
        res.verify().unwrap();
    }
}

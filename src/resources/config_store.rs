//! Load-modify-store of the application's JSON config store.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize as _;
use serde_json::{Map, Value};

use super::helpers::fs::{clear_readonly, match_owner, set_readonly, write_atomic};
use super::identity::TelemetryIdentitySet;
use super::{Applicable, BackupManager, BackupRecord, ResourceChange};
use crate::error::{ResetError, Result};
use crate::logging::Log;

/// Read the store as a JSON object.
///
/// A store that does not parse, or parses to something other than an
/// object, is treated as empty.
///
/// # Errors
///
/// Returns [`ResetError::MissingArtifact`] if the file does not exist, or an
/// I/O error if it cannot be read.
pub fn load(path: &Path, log: &dyn Log) -> Result<Map<String, Value>> {
    if !path.is_file() {
        return Err(ResetError::MissingArtifact {
            path: path.to_path_buf(),
        });
    }
    let raw = fs::read_to_string(path).map_err(|e| ResetError::io(path, e))?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            log.warn(&format!(
                "{} is not a JSON object, starting from an empty store",
                path.display()
            ));
            Ok(Map::new())
        }
        Err(e) => {
            log.warn(&format!(
                "{} does not parse ({e}), starting from an empty store",
                path.display()
            ));
            Ok(Map::new())
        }
    }
}

/// Serialize `map` with four-space indentation and raw UTF-8.
///
/// # Errors
///
/// Returns [`ResetError::Json`] if serialization fails.
pub fn render(path: &Path, map: &Map<String, Value>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    map.serialize(&mut ser).map_err(|source| ResetError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(out)
}

/// Overwrite the four telemetry keys in `store_path`, keeping all others,
/// and mark the file read-only.
///
/// The file is replaced through a temporary sibling, so a failed write
/// leaves the previous content intact. The replacement keeps the previous
/// owner. The caller is responsible for taking a backup first.
///
/// # Errors
///
/// Returns an error if the store is missing, cannot be written, or cannot
/// be made read-only.
pub fn update(store_path: &Path, ids: &TelemetryIdentitySet, log: &dyn Log) -> Result<()> {
    let mut map = load(store_path, log)?;
    for (key, value) in ids.entries() {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    let bytes = render(store_path, &map)?;
    let meta = fs::metadata(store_path).map_err(|e| ResetError::io(store_path, e))?;

    // A previous run left the store read-only.
    clear_readonly(store_path)?;
    write_atomic(store_path, &bytes)?;
    if let Err(e) = match_owner(store_path, &meta) {
        log.warn(&format!("cannot restore owner of {}: {e}", store_path.display()));
    }
    set_readonly(store_path)?;
    log.debug(&format!("wrote {} keys to {}", map.len(), store_path.display()));
    Ok(())
}

/// Telemetry values currently persisted in the store, `None` where absent.
///
/// # Errors
///
/// Returns an error if the store is missing or unreadable.
pub fn read_identities(path: &Path, log: &dyn Log) -> Result<[(String, Option<String>); 4]> {
    let map = load(path, log)?;
    let get = |key: &str| {
        (
            key.to_string(),
            map.get(key).and_then(Value::as_str).map(String::from),
        )
    };
    Ok([
        get(super::identity::KEY_MACHINE_ID),
        get(super::identity::KEY_MAC_MACHINE_ID),
        get(super::identity::KEY_DEV_DEVICE_ID),
        get(super::identity::KEY_SQM_ID),
    ])
}

/// Config store as an orchestrated resource.
#[derive(Debug)]
pub struct ConfigStoreResource<'a> {
    path: PathBuf,
    ids: &'a TelemetryIdentitySet,
    backups: &'a BackupManager,
    log: &'a dyn Log,
}

impl<'a> ConfigStoreResource<'a> {
    /// Create a resource for the store at `path`.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        ids: &'a TelemetryIdentitySet,
        backups: &'a BackupManager,
        log: &'a dyn Log,
    ) -> Self {
        Self {
            path: path.into(),
            ids,
            backups,
            log,
        }
    }
}

impl Applicable for ConfigStoreResource<'_> {
    fn description(&self) -> String {
        format!("config store {}", self.path.display())
    }

    fn backup(&self) -> Result<Option<BackupRecord>> {
        self.backups.backup(&self.path).map(Some)
    }

    fn apply(&self) -> Result<ResourceChange> {
        update(&self.path, self.ids, self.log)?;
        Ok(ResourceChange::Applied)
    }

    fn verify(&self) -> Result<()> {
        let persisted = read_identities(&self.path, self.log)?;
        for ((key, actual), (_, expected)) in persisted.iter().zip(self.ids.entries()) {
            if actual.as_deref() != Some(expected) {
                return Err(ResetError::VerificationMismatch {
                    target: key.clone(),
                    expected: expected.to_string(),
                    actual: actual.clone().unwrap_or_default(),
                });
            }
        }
        Ok(())
    }
}

//! Version gate choosing between the modern and legacy strategies.
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::ResetError;
use crate::logging::Log;
use crate::platform::{PlatformProfile, Strategy};

/// Parsed `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionInfo {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

/// First version whose identifiers are reset without patching the source.
/// Also substituted when the installed version cannot be parsed.
pub const MIN_MODERN_VERSION: VersionInfo = VersionInfo::new(0, 45, 0);

impl VersionInfo {
    /// Build from components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for VersionInfo {
    type Err = ResetError;

    /// Accepts exactly three dot-separated ASCII digit runs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ResetError::VersionParse {
            input: s.to_string(),
        };
        let mut parts = s.split('.').map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u64>().map_err(|_| invalid())
        });
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Ok(Self::new(major?, minor?, patch?))
    }
}

/// Parse `installed`, substituting [`MIN_MODERN_VERSION`] with a warning on
/// failure.
#[must_use]
pub fn parse_or_default(installed: &str, log: &dyn Log) -> VersionInfo {
    installed.trim().parse().unwrap_or_else(|e: ResetError| {
        log.warn(&format!("{e}, assuming {MIN_MODERN_VERSION}"));
        MIN_MODERN_VERSION
    })
}

/// Strategy for `version` under `profile`: legacy below
/// [`MIN_MODERN_VERSION`], otherwise the profile's modern strategy.
#[must_use]
pub fn strategy_for(version: VersionInfo, profile: &dyn PlatformProfile) -> Strategy {
    if version < MIN_MODERN_VERSION {
        Strategy::LegacySourcePatch
    } else {
        profile.modern_strategy()
    }
}

/// Parse `installed_version` and choose a strategy. Never fails.
#[must_use]
pub fn resolve_strategy(
    installed_version: &str,
    profile: &dyn PlatformProfile,
    log: &dyn Log,
) -> Strategy {
    let version = parse_or_default(installed_version, log);
    let strategy = strategy_for(version, profile);
    log.debug(&format!("version {version} selects {strategy}"));
    strategy
}

/// Read the `version` field of `package.json`; empty on any failure.
#[must_use]
pub fn read_installed_version(package_json: &Path, log: &dyn Log) -> String {
    let raw = match std::fs::read_to_string(package_json) {
        Ok(raw) => raw,
        Err(e) => {
            log.warn(&format!("cannot read {}: {e}", package_json.display()));
            return String::new();
        }
    };
    serde_json::from_str::<serde_json::Value>(&raw)
        .ok()
        .and_then(|v| v.get("version").and_then(|v| v.as_str()).map(String::from))
        .unwrap_or_default()
}

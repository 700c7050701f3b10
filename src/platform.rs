//! Platform detection and per-OS profiles.
//!
//! A [`PlatformProfile`] is resolved once at startup from the detected
//! [`Platform`] and the [`Settings`]; it is shared read-only afterwards.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{ResetError, Result};
use crate::exec::Executor;
use crate::resources::identity::MacIdStyle;

/// Registry key holding the Windows machine GUID (relative to HKLM).
pub const CRYPTOGRAPHY_SUBKEY: &str = r"SOFTWARE\Microsoft\Cryptography";

/// Linux system machine identifier.
pub const LINUX_MACHINE_ID: &str = "/etc/machine-id";

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// Linux (any distribution).
    Linux,
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::MacOs => write!(f, "macos"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// How the modern (version-gated) reset mutates identity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// In-process update of the OS identity store and the config store.
    RegistryAndFile,
    /// Fetch and run an external trusted script.
    ScriptDownloadAndRun,
    /// Patch the application's main script so accessors skip cached ids.
    LegacySourcePatch,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistryAndFile => write!(f, "in-process identity update"),
            Self::ScriptDownloadAndRun => write!(f, "trusted script"),
            Self::LegacySourcePatch => write!(f, "legacy source patch"),
        }
    }
}

/// Platform information for the current system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Operating system the process runs on.
    pub os: Os,
    /// Whether the process runs as root / administrator.
    pub elevated: bool,
}

impl Platform {
    /// Detect the current platform and privilege level.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::UnsupportedPlatform`] on any OS other than
    /// Linux, macOS, or Windows.
    pub fn detect(executor: &dyn Executor) -> Result<Self> {
        let os = Self::detect_os()?;
        Ok(Self {
            os,
            elevated: detect_elevated(os, executor),
        })
    }

    /// Create a platform with explicit values.
    #[must_use]
    pub const fn new(os: Os, elevated: bool) -> Self {
        Self { os, elevated }
    }

    fn detect_os() -> Result<Os> {
        if cfg!(target_os = "linux") {
            Ok(Os::Linux)
        } else if cfg!(target_os = "macos") {
            Ok(Os::MacOs)
        } else if cfg!(target_os = "windows") {
            Ok(Os::Windows)
        } else {
            Err(ResetError::UnsupportedPlatform {
                platform: std::env::consts::OS.to_string(),
            })
        }
    }
}

fn detect_elevated(os: Os, executor: &dyn Executor) -> bool {
    match os {
        Os::Windows => windows_is_admin(),
        Os::Linux | Os::MacOs => executor
            .run_unchecked("id", &["-u"])
            .is_ok_and(|r| r.success && r.stdout.trim() == "0"),
    }
}

/// Admin check: the Cryptography key only opens for writing when elevated.
#[cfg(windows)]
fn windows_is_admin() -> bool {
    use winreg::RegKey;
    use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE};
    RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey_with_flags(CRYPTOGRAPHY_SUBKEY, KEY_READ | KEY_WRITE)
        .is_ok()
}

#[cfg(not(windows))]
const fn windows_is_admin() -> bool {
    false
}

/// Filesystem locations of the target application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// JSON config store holding the telemetry keys.
    pub config_store: PathBuf,
    /// Directory receiving timestamped backups.
    pub backup_dir: PathBuf,
    /// `package.json` declaring the installed version.
    pub package_json: PathBuf,
    /// Main script patched by the legacy strategy.
    pub main_script: PathBuf,
}

impl AppPaths {
    /// Derive all paths from a data root and an install directory.
    #[must_use]
    pub fn new(data_root: &Path, install_dir: &Path) -> Self {
        let global_storage = data_root.join("User").join("globalStorage");
        Self {
            config_store: global_storage.join("storage.json"),
            backup_dir: global_storage.join("backups"),
            package_json: install_dir.join("package.json"),
            main_script: install_dir.join("out").join("main.js"),
        }
    }
}

/// OS-specific storage layout, privilege model, and mutation strategy.
pub trait PlatformProfile: Send + Sync + fmt::Debug {
    /// Operating system this profile describes.
    fn os(&self) -> Os;

    /// Application file locations.
    fn paths(&self) -> &AppPaths;

    /// Whether the modern strategy needs root / administrator rights.
    fn requires_elevation(&self) -> bool;

    /// Strategy used when the installed version is recent enough.
    fn modern_strategy(&self) -> Strategy;

    /// Format of the generated `telemetry.macMachineId`.
    fn mac_id_style(&self) -> MacIdStyle {
        MacIdStyle::Hex64
    }

    /// OS identity file mutated alongside the config store, if any.
    fn machine_id_file(&self) -> Option<&Path> {
        None
    }
}

/// Windows: registry `MachineGuid` plus config store; admin required.
#[derive(Debug, Clone)]
pub struct WindowsProfile {
    paths: AppPaths,
}

impl WindowsProfile {
    /// Create from explicit paths.
    #[must_use]
    pub const fn new(paths: AppPaths) -> Self {
        Self { paths }
    }

    fn resolve(settings: &Settings, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let data_root = match &settings.data_dir {
            Some(dir) => dir.clone(),
            None => PathBuf::from(require(env, "APPDATA")?).join(&settings.app_name),
        };
        let install_dir = match &settings.install_dir {
            Some(dir) => dir.clone(),
            None => PathBuf::from(require(env, "LOCALAPPDATA")?)
                .join("Programs")
                .join(&settings.app_name)
                .join("resources")
                .join("app"),
        };
        Ok(Self::new(AppPaths::new(&data_root, &install_dir)))
    }
}

impl PlatformProfile for WindowsProfile {
    fn os(&self) -> Os {
        Os::Windows
    }

    fn paths(&self) -> &AppPaths {
        &self.paths
    }

    fn requires_elevation(&self) -> bool {
        true
    }

    fn modern_strategy(&self) -> Strategy {
        Strategy::RegistryAndFile
    }

    fn mac_id_style(&self) -> MacIdStyle {
        MacIdStyle::GuidTemplate
    }
}

/// macOS: no in-process mutation; a trusted script runs under sudo.
#[derive(Debug, Clone)]
pub struct MacOsProfile {
    paths: AppPaths,
}

impl MacOsProfile {
    /// Create from explicit paths.
    #[must_use]
    pub const fn new(paths: AppPaths) -> Self {
        Self { paths }
    }

    fn resolve(settings: &Settings, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let data_root = match &settings.data_dir {
            Some(dir) => dir.clone(),
            None => PathBuf::from(require(env, "HOME")?)
                .join("Library")
                .join("Application Support")
                .join(&settings.app_name),
        };
        let install_dir = settings.install_dir.clone().unwrap_or_else(|| {
            PathBuf::from("/Applications")
                .join(format!("{}.app", settings.app_name))
                .join("Contents")
                .join("Resources")
                .join("app")
        });
        Ok(Self::new(AppPaths::new(&data_root, &install_dir)))
    }
}

impl PlatformProfile for MacOsProfile {
    fn os(&self) -> Os {
        Os::MacOs
    }

    fn paths(&self) -> &AppPaths {
        &self.paths
    }

    fn requires_elevation(&self) -> bool {
        true
    }

    fn modern_strategy(&self) -> Strategy {
        Strategy::ScriptDownloadAndRun
    }
}

/// Linux: `/etc/machine-id` plus config store; root or sudo required.
#[derive(Debug, Clone)]
pub struct LinuxProfile {
    paths: AppPaths,
    machine_id: PathBuf,
}

impl LinuxProfile {
    /// Create from explicit paths.
    #[must_use]
    pub const fn new(paths: AppPaths, machine_id: PathBuf) -> Self {
        Self { paths, machine_id }
    }

    fn resolve(settings: &Settings, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let data_root = match &settings.data_dir {
            Some(dir) => dir.clone(),
            None => {
                let config_base = match env("XDG_CONFIG_HOME") {
                    Some(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
                    _ => PathBuf::from(require(env, "HOME")?).join(".config"),
                };
                config_base.join(&settings.app_name)
            }
        };
        let install_dir = settings
            .install_dir
            .clone()
            .unwrap_or_else(|| linux_install_dir(&settings.app_name));
        Ok(Self::new(
            AppPaths::new(&data_root, &install_dir),
            PathBuf::from(LINUX_MACHINE_ID),
        ))
    }
}

/// First candidate install directory that contains a `package.json`,
/// falling back to the first candidate.
fn linux_install_dir(app_name: &str) -> PathBuf {
    let opt = PathBuf::from("/opt").join(app_name).join("resources/app");
    let share = PathBuf::from("/usr/share")
        .join(app_name.to_lowercase())
        .join("resources/app");
    if !opt.join("package.json").exists() && share.join("package.json").exists() {
        return share;
    }
    opt
}

impl PlatformProfile for LinuxProfile {
    fn os(&self) -> Os {
        Os::Linux
    }

    fn paths(&self) -> &AppPaths {
        &self.paths
    }

    fn requires_elevation(&self) -> bool {
        true
    }

    fn modern_strategy(&self) -> Strategy {
        Strategy::RegistryAndFile
    }

    fn machine_id_file(&self) -> Option<&Path> {
        Some(&self.machine_id)
    }
}

fn require(env: &dyn Fn(&str) -> Option<String>, var: &str) -> Result<String> {
    env(var)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ResetError::Environment {
            var: var.to_string(),
        })
}

/// Resolve the profile for `platform` from the process environment.
///
/// # Errors
///
/// Returns [`ResetError::Environment`] when a variable needed to locate the
/// application's data directory is unset.
pub fn resolve_profile(
    platform: &Platform,
    settings: &Settings,
) -> Result<Arc<dyn PlatformProfile>> {
    resolve_profile_with(platform, settings, &|var| std::env::var(var).ok())
}

/// Resolve the profile using `env` for variable lookups.
///
/// # Errors
///
/// Returns [`ResetError::Environment`] when a required variable is missing.
pub fn resolve_profile_with(
    platform: &Platform,
    settings: &Settings,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Arc<dyn PlatformProfile>> {
    Ok(match platform.os {
        Os::Windows => Arc::new(WindowsProfile::resolve(settings, env)?),
        Os::MacOs => Arc::new(MacOsProfile::resolve(settings, env)?),
        Os::Linux => Arc::new(LinuxProfile::resolve(settings, env)?),
    })
}

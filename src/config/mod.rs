//! Engine settings loaded from an optional TOML file.
pub mod toml_loader;

use anyhow::{Context as _, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default trusted script for the macOS reset path.
pub const DEFAULT_SCRIPT_URL: &str = "https://raw.githubusercontent.com/yuaotian/go-cursor-help/refs/heads/master/scripts/run/cursor_mac_id_modifier.sh";

/// Resolved engine settings.
///
/// Built once at startup (file values, then CLI overrides) and passed
/// explicitly to every component; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Display name of the target application; also names its data folder.
    pub app_name: String,
    /// Process names to terminate before mutation (case-insensitive).
    pub process_names: Vec<String>,
    /// How long to wait for target processes to exit.
    pub termination_timeout_secs: u64,
    /// Poll interval of the termination wait loop. Must be sub-second.
    pub poll_interval_ms: u64,
    /// Continue with mutation when processes survive the timeout.
    pub proceed_on_timeout: bool,
    /// Fail the legacy patch when no accessor pattern matched.
    pub strict_patch: bool,
    /// URL of the trusted script executed on macOS.
    pub script_url: String,
    /// Override for the application data root (holds `User/globalStorage`).
    pub data_dir: Option<PathBuf>,
    /// Override for the application install directory (holds `package.json`).
    pub install_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Cursor".to_string(),
            process_names: vec!["Cursor".to_string(), "cursor".to_string()],
            termination_timeout_secs: 10,
            poll_interval_ms: 250,
            proceed_on_timeout: true,
            strict_patch: false,
            script_url: DEFAULT_SCRIPT_URL.to_string(),
            data_dir: None,
            install_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from `explicit` if given, otherwise from the default
    /// location when a file exists there.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file does not exist, a file
    /// fails to parse, or the resulting settings are invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let settings: Self = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("config file not found: {}", path.display());
                }
                toml_loader::load_config(path)?
            }
            None => match default_config_path() {
                Some(path) => toml_loader::load_config(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => Self::default(),
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            bail!("app_name must not be empty");
        }
        if self.process_names.iter().all(|n| n.trim().is_empty()) {
            bail!("process_names must contain at least one name");
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms >= 1000 {
            bail!(
                "poll_interval_ms must be between 1 and 999 (got {})",
                self.poll_interval_ms
            );
        }
        if !self.script_url.starts_with("https://") {
            bail!("script_url must use https: {}", self.script_url);
        }
        Ok(())
    }

    /// Termination wait budget.
    #[must_use]
    pub const fn termination_timeout(&self) -> Duration {
        Duration::from_secs(self.termination_timeout_secs)
    }

    /// Termination poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `$XDG_CONFIG_HOME/idreset/config.toml` (or the platform equivalent).
fn default_config_path() -> Option<PathBuf> {
    let base = if cfg!(windows) {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    } else {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }?;
    Some(base.join("idreset").join("config.toml"))
}

//! Subcommand implementations and their shared setup.
pub mod generate;
pub mod reset;
pub mod version;

use std::sync::Arc;

use anyhow::Result;

use crate::cli::{GlobalOpts, ResetOpts};
use crate::config::Settings;
use crate::exec::SystemExecutor;
use crate::logging::Logger;
use crate::platform::{self, Platform, PlatformProfile};

/// Shared state produced by the common command setup sequence.
///
/// Encapsulates platform detection, settings loading, and profile
/// resolution so that each command does not have to repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Detected platform and privilege level.
    pub platform: Platform,
    /// Settings with CLI overrides applied.
    pub settings: Settings,
    /// Profile resolved for `platform`.
    pub profile: Arc<dyn PlatformProfile>,
}

impl CommandSetup {
    /// Detect the platform, load settings, apply CLI overrides, and resolve
    /// the platform profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS is unsupported, the settings file fails to
    /// load or validate, or a variable needed to locate the application is
    /// unset.
    pub fn init(global: &GlobalOpts, opts: &ResetOpts, log: &Logger) -> Result<Self> {
        let platform = Platform::detect(&SystemExecutor)?;
        log.info(&format!(
            "platform: {}{}",
            platform.os,
            if platform.elevated { " (elevated)" } else { "" }
        ));

        log.stage("Loading settings");
        let settings = apply_overrides(Settings::load(global.config.as_deref())?, opts);
        settings.validate()?;
        log.debug(&format!("app: {}", settings.app_name));
        log.debug(&format!("process names: {}", settings.process_names.join(", ")));
        log.debug(&format!(
            "termination timeout: {}s (poll {}ms)",
            settings.termination_timeout_secs, settings.poll_interval_ms
        ));

        let profile = platform::resolve_profile(&platform, &settings)?;
        let paths = profile.paths();
        log.info(&format!("config store: {}", paths.config_store.display()));
        log.debug(&format!("backups: {}", paths.backup_dir.display()));
        log.debug(&format!("package.json: {}", paths.package_json.display()));

        Ok(Self {
            platform,
            settings,
            profile,
        })
    }
}

/// Layer `reset` flags over file settings. Flags only ever tighten or
/// replace; an absent flag keeps the file value.
#[must_use]
pub fn apply_overrides(mut settings: Settings, opts: &ResetOpts) -> Settings {
    if let Some(secs) = opts.timeout {
        settings.termination_timeout_secs = secs;
    }
    if opts.strict_patch {
        settings.strict_patch = true;
    }
    if opts.require_termination {
        settings.proceed_on_timeout = false;
    }
    if let Some(dir) = &opts.data_dir {
        settings.data_dir = Some(dir.clone());
    }
    if let Some(dir) = &opts.install_dir {
        settings.install_dir = Some(dir.clone());
    }
    settings
}

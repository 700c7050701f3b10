//! Shared, read-only inputs of a reset run.
use std::sync::Arc;

use crate::config::Settings;
use crate::exec::{Executor, SystemExecutor};
use crate::logging::Log;
use crate::platform::{Platform, PlatformProfile};
use crate::resources::process::{ProcessTable, SysinfoProcessTable};
use crate::resources::registry::{GuidStore, default_guid_store};
use crate::resources::remote_script::{HttpScriptSource, TrustedScriptSource};

/// Everything a reset run reads; immutable once built.
pub struct ResetContext {
    /// Resolved settings (file values plus CLI overrides).
    pub settings: Arc<Settings>,
    /// Detected platform and privilege level.
    pub platform: Platform,
    /// OS-specific paths and strategy.
    pub profile: Arc<dyn PlatformProfile>,
    /// Logger for output and step recording.
    pub log: Arc<dyn Log>,
    /// Log intended mutations without performing them.
    pub dry_run: bool,
    /// Command executor (for testing or real system calls).
    pub executor: Arc<dyn Executor>,
    /// Process list used by the termination guard.
    pub processes: Arc<dyn ProcessTable>,
    /// Registry `MachineGuid` access; `None` off Windows.
    pub guid_store: Option<Arc<dyn GuidStore>>,
    /// Source of the macOS reset script.
    pub script_source: Arc<dyn TrustedScriptSource>,
    /// Version to gate on instead of reading `package.json`.
    pub assume_version: Option<String>,
}

impl std::fmt::Debug for ResetContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetContext")
            .field("settings", &self.settings)
            .field("platform", &self.platform)
            .field("profile", &self.profile)
            .field("log", &"<dyn Log>")
            .field("dry_run", &self.dry_run)
            .field("executor", &"<dyn Executor>")
            .field("processes", &"<dyn ProcessTable>")
            .field("guid_store", &self.guid_store.as_ref().map(|_| "<dyn GuidStore>"))
            .field("script_source", &self.script_source.origin())
            .field("assume_version", &self.assume_version)
            .finish()
    }
}

impl ResetContext {
    /// Creates a context wired to the real system: `sysinfo` process table,
    /// the Windows registry (when available) and the configured script URL.
    #[must_use]
    pub fn new(
        settings: Arc<Settings>,
        platform: Platform,
        profile: Arc<dyn PlatformProfile>,
        log: Arc<dyn Log>,
        dry_run: bool,
    ) -> Self {
        let script_source = Arc::new(HttpScriptSource::new(settings.script_url.clone()));
        Self {
            settings,
            platform,
            profile,
            log,
            dry_run,
            executor: Arc::new(SystemExecutor),
            processes: Arc::new(SysinfoProcessTable::default()),
            guid_store: default_guid_store(),
            script_source,
            assume_version: None,
        }
    }

    /// Replace the command executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the process table.
    #[must_use]
    pub fn with_process_table(mut self, processes: Arc<dyn ProcessTable>) -> Self {
        self.processes = processes;
        self
    }

    /// Replace the registry `MachineGuid` store.
    #[must_use]
    pub fn with_guid_store(mut self, store: Arc<dyn GuidStore>) -> Self {
        self.guid_store = Some(store);
        self
    }

    /// Replace the trusted script source.
    #[must_use]
    pub fn with_script_source(mut self, source: Arc<dyn TrustedScriptSource>) -> Self {
        self.script_source = source;
        self
    }

    /// Gate on `version` instead of the installed `package.json`.
    #[must_use]
    pub fn with_assumed_version(mut self, version: Option<String>) -> Self {
        self.assume_version = version;
        self
    }
}

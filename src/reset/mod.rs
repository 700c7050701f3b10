//! Reset orchestration.
//!
//! A run walks `Init → Guarding → StrategySelected → BackedUp → Mutated →
//! Verified → Done`. Any failure moves to [`ResetState::Failed`] and aborts
//! the remaining steps; nothing is retried and earlier mutations are not
//! rolled back.
mod context;
pub mod state;
pub mod version;

pub use context::ResetContext;
pub use state::ResetState;

use crate::error::{ResetError, Result, elevation_hint};
use crate::logging::StepStatus;
use crate::platform::{Os, Strategy};
use crate::resources::config_store::ConfigStoreResource;
use crate::resources::identity::{TelemetryIdentitySet, new_linux_machine_id, new_machine_guid};
use crate::resources::legacy_patch::LegacyPatchResource;
use crate::resources::machine_id::MachineIdResource;
use crate::resources::process::ProcessGuard;
use crate::resources::registry::MachineGuidResource;
use crate::resources::remote_script::RemoteScriptResource;
use crate::resources::{Applicable, BackupManager, BackupRecord, ResourceChange};

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct ResetReport {
    /// Strategy chosen by the version gate.
    pub strategy: Strategy,
    /// Identifiers written to the config store (registry/file strategy only).
    pub identities: Option<TelemetryIdentitySet>,
    /// Backups taken before mutation.
    pub backups: Vec<BackupRecord>,
    /// Processes asked to exit.
    pub terminated: Vec<u32>,
}

/// Sequences one reset run over a [`ResetContext`].
#[derive(Debug)]
pub struct ResetOrchestrator<'a> {
    ctx: &'a ResetContext,
    state: ResetState,
    history: Vec<ResetState>,
}

impl<'a> ResetOrchestrator<'a> {
    /// Create an orchestrator in [`ResetState::Init`].
    #[must_use]
    pub fn new(ctx: &'a ResetContext) -> Self {
        Self {
            ctx,
            state: ResetState::Init,
            history: vec![ResetState::Init],
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ResetState {
        self.state
    }

    /// Every state entered so far, in order.
    #[must_use]
    pub fn history(&self) -> &[ResetState] {
        &self.history
    }

    /// Run every step to [`ResetState::Done`].
    ///
    /// # Errors
    ///
    /// Returns the first hard error; the orchestrator is then in
    /// [`ResetState::Failed`]. Mutations applied before the failure stay
    /// in place.
    pub fn run(&mut self) -> Result<ResetReport> {
        let mut pending = self.upcoming()?;
        match self.run_steps(&mut pending) {
            Ok(report) => Ok(report),
            Err(e) => {
                let log = self.ctx.log.as_ref();
                log.error(&format!("{}: {e}", pending.label()));
                log.record_step(pending.label(), StepStatus::Failed, Some(&e.to_string()));
                self.enter(ResetState::Failed);
                Err(e)
            }
        }
    }

    /// The state a successful step moves to.
    fn upcoming(&self) -> Result<ResetState> {
        self.state
            .next()
            .ok_or(ResetError::InvalidTransition { from: self.state })
    }

    /// Move to the successor of the current state.
    fn advance(&mut self) -> Result<ResetState> {
        let next = self.upcoming()?;
        self.enter(next);
        Ok(next)
    }

    fn enter(&mut self, next: ResetState) {
        self.ctx.log.debug(&format!("state {} -> {next}", self.state));
        self.state = next;
        self.history.push(next);
    }

    /// Termination runs inside `Guarding`; every later step runs before
    /// entering the state it completes.
    fn run_steps(&mut self, pending: &mut ResetState) -> Result<ResetReport> {
        let ctx = self.ctx;
        let log = ctx.log.as_ref();

        *pending = self.advance()?;
        log.stage(pending.label());
        let terminated = self.guard()?;

        *pending = self.upcoming()?;
        log.stage(pending.label());
        let strategy = self.select_strategy();
        self.check_privileges(strategy)?;
        let identities = TelemetryIdentitySet::generate(ctx.profile.mac_id_style());
        let backups = BackupManager::new(&ctx.profile.paths().backup_dir);
        let plan = build_plan(ctx, strategy, &identities, &backups)?;
        log.record_step(pending.label(), StepStatus::Ok, Some(&strategy.to_string()));
        self.advance()?;

        *pending = self.upcoming()?;
        log.stage(pending.label());
        let records = self.backup_all(&plan)?;
        self.advance()?;

        *pending = self.upcoming()?;
        log.stage(pending.label());
        self.apply_all(&plan)?;
        self.advance()?;

        *pending = self.upcoming()?;
        log.stage(pending.label());
        self.verify_all(&plan)?;
        self.advance()?;

        self.advance()?;
        Ok(ResetReport {
            strategy,
            identities: (strategy == Strategy::RegistryAndFile).then(|| identities.clone()),
            backups: records,
            terminated,
        })
    }

    /// Ask running instances to exit. A timeout is soft unless the settings
    /// forbid proceeding.
    fn guard(&self) -> Result<Vec<u32>> {
        let ctx = self.ctx;
        let log = ctx.log.as_ref();
        let label = ResetState::Guarding.label();
        let guard = ProcessGuard::new(ctx.processes.as_ref(), ctx.settings.poll_interval(), log);
        let names = &ctx.settings.process_names;

        if ctx.dry_run {
            for p in guard.find(names) {
                log.dry_run(&format!("would terminate {} (pid {})", p.name, p.pid));
            }
            log.record_step(label, StepStatus::DryRun, None);
            return Ok(Vec::new());
        }

        match guard.terminate_all(names, ctx.settings.termination_timeout()) {
            Ok(pids) => {
                log.record_step(label, StepStatus::Ok, None);
                Ok(pids)
            }
            Err(ref e @ ResetError::ProcessTerminationTimeout { ref signalled, .. })
                if ctx.settings.proceed_on_timeout =>
            {
                log.warn(&format!("{e}, continuing"));
                log.record_step(label, StepStatus::Warned, Some(&e.to_string()));
                Ok(signalled.clone())
            }
            Err(e) => Err(e),
        }
    }

    fn select_strategy(&self) -> Strategy {
        let ctx = self.ctx;
        let log = ctx.log.as_ref();
        let installed = ctx.assume_version.clone().unwrap_or_else(|| {
            version::read_installed_version(&ctx.profile.paths().package_json, log)
        });
        let strategy = version::resolve_strategy(&installed, ctx.profile.as_ref(), log);
        log.info(&format!(
            "{} on {}: {strategy}",
            if installed.is_empty() { "unknown version" } else { &installed },
            ctx.profile.os()
        ));
        strategy
    }

    /// Fail fast when the chosen strategy needs privileges the process lacks
    /// and cannot borrow through `sudo`.
    fn check_privileges(&self, strategy: Strategy) -> Result<()> {
        let ctx = self.ctx;
        if strategy == Strategy::LegacySourcePatch
            || !ctx.profile.requires_elevation()
            || ctx.platform.elevated
        {
            return Ok(());
        }
        if ctx.profile.os() != Os::Windows && ctx.executor.which("sudo") {
            ctx.log.info("not running as root, privileged steps will use sudo");
            return Ok(());
        }
        let err = ResetError::PermissionDenied {
            target: format!("{strategy} on {}", ctx.profile.os()),
            remediation: elevation_hint().to_string(),
        };
        if ctx.dry_run {
            ctx.log.warn(&format!("{err}, continuing dry run"));
            return Ok(());
        }
        Err(err)
    }

    fn backup_all(&self, plan: &[Box<dyn Applicable + '_>]) -> Result<Vec<BackupRecord>> {
        let log = self.ctx.log.as_ref();
        let label = ResetState::BackedUp.label();
        if self.ctx.dry_run {
            for resource in plan {
                log.dry_run(&format!("would back up {}", resource.description()));
            }
            log.record_step(label, StepStatus::DryRun, None);
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for resource in plan {
            if let Some(record) = resource.backup()? {
                log.info(&format!(
                    "backed up {} to {}",
                    resource.description(),
                    record.backup.display()
                ));
                records.push(record);
            }
        }
        log.record_step(
            label,
            StepStatus::Ok,
            Some(&format!("{} backup(s)", records.len())),
        );
        Ok(records)
    }

    fn apply_all(&self, plan: &[Box<dyn Applicable + '_>]) -> Result<()> {
        let log = self.ctx.log.as_ref();
        let label = ResetState::Mutated.label();
        if self.ctx.dry_run {
            for resource in plan {
                log.dry_run(&format!("would update {}", resource.description()));
            }
            log.record_step(label, StepStatus::DryRun, None);
            return Ok(());
        }

        let mut skipped = Vec::new();
        for resource in plan {
            match resource.apply()? {
                ResourceChange::Applied => {
                    log.debug(&format!("applied {}", resource.description()));
                }
                ResourceChange::AlreadyCorrect => {
                    log.info(&format!("{} already up to date", resource.description()));
                }
                ResourceChange::Skipped { reason } => skipped.push(reason),
            }
        }
        if skipped.is_empty() {
            log.record_step(label, StepStatus::Ok, None);
        } else {
            log.record_step(label, StepStatus::Warned, Some(&skipped.join("; ")));
        }
        Ok(())
    }

    fn verify_all(&self, plan: &[Box<dyn Applicable + '_>]) -> Result<()> {
        let log = self.ctx.log.as_ref();
        let label = ResetState::Verified.label();
        if self.ctx.dry_run {
            log.record_step(label, StepStatus::DryRun, None);
            return Ok(());
        }
        for resource in plan {
            resource.verify()?;
            log.debug(&format!("verified {}", resource.description()));
        }
        log.record_step(label, StepStatus::Ok, None);
        Ok(())
    }
}

/// Resources mutated by `strategy`, in mutation order.
fn build_plan<'p>(
    ctx: &'p ResetContext,
    strategy: Strategy,
    identities: &'p TelemetryIdentitySet,
    backups: &'p BackupManager,
) -> Result<Vec<Box<dyn Applicable + 'p>>> {
    let log = ctx.log.as_ref();
    let paths = ctx.profile.paths();

    let mut plan: Vec<Box<dyn Applicable + 'p>> = Vec::new();
    match strategy {
        Strategy::LegacySourcePatch => {
            plan.push(Box::new(LegacyPatchResource::new(
                paths.main_script.clone(),
                ctx.settings.strict_patch,
                log,
            )?));
        }
        Strategy::ScriptDownloadAndRun => {
            plan.push(Box::new(RemoteScriptResource::new(
                ctx.script_source.as_ref(),
                ctx.executor.as_ref(),
                ctx.platform.elevated,
                log,
            )));
        }
        Strategy::RegistryAndFile => {
            if let Some(machine_id) = ctx.profile.machine_id_file() {
                plan.push(Box::new(MachineIdResource::new(
                    machine_id,
                    new_linux_machine_id(),
                    ctx.platform.elevated,
                    ctx.executor.as_ref(),
                    backups,
                    log,
                )));
            }
            plan.push(Box::new(ConfigStoreResource::new(
                paths.config_store.clone(),
                identities,
                backups,
                log,
            )));
            if ctx.profile.os() == Os::Windows {
                let store = ctx.guid_store.as_deref().ok_or_else(|| {
                    ResetError::UnsupportedPlatform {
                        platform: "windows registry unavailable".to_string(),
                    }
                })?;
                plan.push(Box::new(MachineGuidResource::new(
                    store,
                    ctx.executor.as_ref(),
                    backups.dir(),
                    new_machine_guid(),
                    log,
                )));
            }
        }
    }
    Ok(plan)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::config::Settings;
    use crate::exec::test_helpers::MockExecutor;
    use crate::logging::Logger;
    use crate::platform::{AppPaths, LinuxProfile, Platform, PlatformProfile, WindowsProfile};
    use crate::resources::process::{ProcessInfo, ProcessTable};
    use crate::resources::registry::MockGuidStore;
    use crate::resources::remote_script::MockTrustedScriptSource;

    #[derive(Debug, Default)]
    struct NoProcesses;

    impl ProcessTable for NoProcesses {
        fn find(&self, _names: &[String]) -> Vec<ProcessInfo> {
            Vec::new()
        }

        fn terminate(&self, _pid: u32) -> bool {
            true
        }
    }

    #[derive(Debug)]
    struct Stubborn;

    impl ProcessTable for Stubborn {
        fn find(&self, _names: &[String]) -> Vec<ProcessInfo> {
            vec![ProcessInfo {
                pid: 99,
                name: "Cursor".to_string(),
            }]
        }

        fn terminate(&self, _pid: u32) -> bool {
            true
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        paths: AppPaths,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let paths = AppPaths::new(&dir.path().join("data"), &dir.path().join("install"));
            std::fs::create_dir_all(paths.config_store.parent().unwrap()).unwrap();
            std::fs::write(&paths.config_store, r#"{"unrelated": "x"}"#).unwrap();
            Self { dir, paths }
        }

        fn machine_id(&self) -> std::path::PathBuf {
            self.dir.path().join("machine-id")
        }

        fn context(
            &self,
            profile: Arc<dyn PlatformProfile>,
            os: Os,
            settings: Settings,
            dry_run: bool,
        ) -> ResetContext {
            ResetContext::new(
                Arc::new(settings),
                Platform::new(os, true),
                profile,
                Arc::new(Logger::new("test")),
                dry_run,
            )
            .with_executor(Arc::new(MockExecutor::default()))
            .with_process_table(Arc::new(NoProcesses))
            .with_assumed_version(Some("0.46.0".to_string()))
        }

        fn linux(&self) -> Arc<dyn PlatformProfile> {
            Arc::new(LinuxProfile::new(self.paths.clone(), self.machine_id()))
        }
    }

    fn fast_settings() -> Settings {
        Settings {
            termination_timeout_secs: 0,
            poll_interval_ms: 10,
            ..Settings::default()
        }
    }

    fn read_store(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn linux_reset_reaches_done() {
        let fx = Fixture::new();
        std::fs::write(fx.machine_id(), "ffffffffffffffffffffffffffffffff\n").unwrap();
        let ctx = fx.context(fx.linux(), Os::Linux, fast_settings(), false);

        let mut orchestrator = ResetOrchestrator::new(&ctx);
        let report = orchestrator.run().unwrap();

        assert_eq!(orchestrator.state(), ResetState::Done);
        assert_eq!(
            orchestrator.history(),
            &[
                ResetState::Init,
                ResetState::Guarding,
                ResetState::StrategySelected,
                ResetState::BackedUp,
                ResetState::Mutated,
                ResetState::Verified,
                ResetState::Done,
            ]
        );
        assert_eq!(report.strategy, Strategy::RegistryAndFile);
        assert_eq!(report.backups.len(), 2);

        let ids = report.identities.unwrap();
        let store = read_store(&fx.paths.config_store);
        assert_eq!(store["unrelated"], "x");
        assert_eq!(store["telemetry.machineId"], ids.machine_id.as_str());
        assert_eq!(store["telemetry.sqmId"], ids.sqm_id.as_str());

        let new_id = std::fs::read_to_string(fx.machine_id()).unwrap();
        assert_eq!(new_id.trim_end().len(), 32);
        assert_ne!(new_id, "ffffffffffffffffffffffffffffffff\n");
    }

    #[test]
    fn windows_registry_mismatch_fails_without_done() {
        let fx = Fixture::new();
        let mut store = MockGuidStore::new();
        store.expect_read().returning(|| Ok("stale-guid".to_string()));
        store.expect_write().returning(|_| Ok(()));
        let profile: Arc<dyn PlatformProfile> = Arc::new(WindowsProfile::new(fx.paths.clone()));
        let ctx = fx
            .context(profile, Os::Windows, fast_settings(), false)
            .with_guid_store(Arc::new(store));

        let mut orchestrator = ResetOrchestrator::new(&ctx);
        let err = orchestrator.run().unwrap_err();

        assert!(matches!(err, ResetError::VerificationMismatch { .. }));
        assert_eq!(orchestrator.state(), ResetState::Failed);
        assert!(!orchestrator.history().contains(&ResetState::Done));
        assert!(!orchestrator.history().contains(&ResetState::Mutated));
    }

    #[test]
    fn windows_without_registry_access_is_unsupported() {
        let fx = Fixture::new();
        let profile: Arc<dyn PlatformProfile> = Arc::new(WindowsProfile::new(fx.paths.clone()));
        let mut ctx = fx.context(profile, Os::Windows, fast_settings(), false);
        ctx.guid_store = None;

        let mut orchestrator = ResetOrchestrator::new(&ctx);
        assert!(matches!(
            orchestrator.run().unwrap_err(),
            ResetError::UnsupportedPlatform { .. }
        ));
        assert_eq!(
            read_store(&fx.paths.config_store),
            serde_json::json!({"unrelated": "x"})
        );
    }

    #[test]
    fn missing_config_store_fails_before_mutation() {
        let fx = Fixture::new();
        std::fs::remove_file(&fx.paths.config_store).unwrap();
        let ctx = fx.context(fx.linux(), Os::Linux, fast_settings(), false);

        let mut orchestrator = ResetOrchestrator::new(&ctx);
        let err = orchestrator.run().unwrap_err();
        assert!(matches!(err, ResetError::MissingArtifact { .. }));
        assert!(!orchestrator.history().contains(&ResetState::BackedUp));
    }

    #[test]
    fn unprivileged_without_sudo_is_denied() {
        let fx = Fixture::new();
        let ctx = ResetContext::new(
            Arc::new(fast_settings()),
            Platform::new(Os::Linux, false),
            fx.linux(),
            Arc::new(Logger::new("test")),
            false,
        )
        .with_executor(Arc::new(MockExecutor::default().with_which(false)))
        .with_process_table(Arc::new(NoProcesses))
        .with_assumed_version(Some("1.0.0".to_string()));

        let err = ResetOrchestrator::new(&ctx).run().unwrap_err();
        assert!(matches!(err, ResetError::PermissionDenied { .. }));
        assert_eq!(
            read_store(&fx.paths.config_store),
            serde_json::json!({"unrelated": "x"})
        );
    }

    #[test]
    fn legacy_version_patches_main_script_only() {
        let fx = Fixture::new();
        let main = &fx.paths.main_script;
        std::fs::create_dir_all(main.parent().unwrap()).unwrap();
        std::fs::write(main, "async getMachineId(){return a??b()}").unwrap();
        let ctx = fx
            .context(fx.linux(), Os::Linux, fast_settings(), false)
            .with_assumed_version(Some("0.44.9".to_string()));

        let report = ResetOrchestrator::new(&ctx).run().unwrap();
        assert_eq!(report.strategy, Strategy::LegacySourcePatch);
        assert!(report.identities.is_none());
        assert_eq!(
            std::fs::read_to_string(main).unwrap(),
            "async getMachineId(){return b()}"
        );
        assert_eq!(
            read_store(&fx.paths.config_store),
            serde_json::json!({"unrelated": "x"})
        );
    }

    #[test]
    fn script_strategy_runs_trusted_script() {
        let fx = Fixture::new();
        let mut source = MockTrustedScriptSource::new();
        source
            .expect_origin()
            .returning(|| "https://example.invalid/reset.sh".to_string());
        source.expect_fetch().times(1).returning(|| Ok("true\n".to_string()));
        let exec = Arc::new(MockExecutor::with_responses(vec![(true, String::new())]));
        let profile: Arc<dyn PlatformProfile> = Arc::new(crate::platform::MacOsProfile::new(
            fx.paths.clone(),
        ));
        let ctx = fx
            .context(profile, Os::MacOs, fast_settings(), false)
            .with_executor(exec.clone())
            .with_script_source(Arc::new(source));

        let report = ResetOrchestrator::new(&ctx).run().unwrap();
        assert_eq!(report.strategy, Strategy::ScriptDownloadAndRun);
        assert_eq!(exec.calls(), vec!["bash -s".to_string()]);
        assert!(report.backups.is_empty());
    }

    #[test]
    fn termination_timeout_is_soft_by_default() {
        let fx = Fixture::new();
        let ctx = fx
            .context(fx.linux(), Os::Linux, fast_settings(), false)
            .with_process_table(Arc::new(Stubborn));
        let mut orchestrator = ResetOrchestrator::new(&ctx);
        let report = orchestrator.run().unwrap();
        assert_eq!(orchestrator.state(), ResetState::Done);
        assert_eq!(report.terminated, vec![99]);
    }

    #[test]
    fn termination_timeout_is_fatal_when_required() {
        let fx = Fixture::new();
        let settings = Settings {
            proceed_on_timeout: false,
            ..fast_settings()
        };
        let ctx = fx
            .context(fx.linux(), Os::Linux, settings, false)
            .with_process_table(Arc::new(Stubborn));
        let mut orchestrator = ResetOrchestrator::new(&ctx);
        let err = orchestrator.run().unwrap_err();
        assert!(matches!(err, ResetError::ProcessTerminationTimeout { .. }));
        assert_eq!(
            orchestrator.history(),
            &[ResetState::Init, ResetState::Guarding, ResetState::Failed]
        );
    }

    #[test]
    fn dry_run_walks_every_state_without_writing() {
        let fx = Fixture::new();
        std::fs::write(fx.machine_id(), "old\n").unwrap();
        let ctx = fx.context(fx.linux(), Os::Linux, fast_settings(), true);

        let mut orchestrator = ResetOrchestrator::new(&ctx);
        let report = orchestrator.run().unwrap();

        assert_eq!(orchestrator.state(), ResetState::Done);
        assert!(report.backups.is_empty());
        assert_eq!(
            read_store(&fx.paths.config_store),
            serde_json::json!({"unrelated": "x"})
        );
        assert_eq!(std::fs::read_to_string(fx.machine_id()).unwrap(), "old\n");
        assert!(!fx.paths.backup_dir.exists());
    }

    #[test]
    fn finished_orchestrator_cannot_rerun() {
        let fx = Fixture::new();
        let ctx = fx.context(fx.linux(), Os::Linux, fast_settings(), true);
        let mut orchestrator = ResetOrchestrator::new(&ctx);
        orchestrator.run().unwrap();
        let err = orchestrator.run().unwrap_err();
        assert!(matches!(
            err,
            ResetError::InvalidTransition {
                from: ResetState::Done
            }
        ));
        assert_eq!(orchestrator.state(), ResetState::Done);
        assert_eq!(orchestrator.history().last(), Some(&ResetState::Done));
    }
}

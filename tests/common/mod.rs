// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed application layout plus in-memory
// stand-ins for the process table, registry store, and command executor so
// each integration test can drive a full reset without touching the host.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use idreset_cli::config::Settings;
use idreset_cli::exec::{ExecResult, Executor, OutputStream};
use idreset_cli::logging::Logger;
use idreset_cli::platform::{
    AppPaths, LinuxProfile, MacOsProfile, Platform, PlatformProfile, WindowsProfile,
};
use idreset_cli::reset::ResetContext;
use idreset_cli::resources::process::{ProcessInfo, ProcessTable};
use idreset_cli::resources::registry::GuidStore;

/// An isolated application install backed by a [`tempfile::TempDir`].
///
/// Layout under the temporary root:
/// - `data/User/globalStorage/storage.json`  config store
/// - `install/package.json`                   declared version
/// - `install/out/main.js`                    legacy patch target
/// - `machine-id`                             stand-in for `/etc/machine-id`
pub struct IntegrationTestContext {
    /// Temporary directory holding the layout.
    pub root: tempfile::TempDir,
    /// Paths derived from the layout.
    pub paths: AppPaths,
}

impl IntegrationTestContext {
    /// Create a layout whose config store holds `store_json`.
    pub fn new(store_json: &str) -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let paths = AppPaths::new(&root.path().join("data"), &root.path().join("install"));
        std::fs::create_dir_all(paths.config_store.parent().expect("store parent"))
            .expect("create globalStorage");
        std::fs::write(&paths.config_store, store_json).expect("write storage.json");
        Self { root, paths }
    }

    /// Write `package.json` declaring `version`.
    pub fn with_version(self, version: &str) -> Self {
        std::fs::create_dir_all(self.paths.package_json.parent().expect("install dir"))
            .expect("create install dir");
        std::fs::write(
            &self.paths.package_json,
            format!(r#"{{"name": "app", "version": "{version}"}}"#),
        )
        .expect("write package.json");
        self
    }

    /// Write the main script patched by the legacy strategy.
    pub fn with_main_script(self, source: &str) -> Self {
        std::fs::create_dir_all(self.paths.main_script.parent().expect("out dir"))
            .expect("create out dir");
        std::fs::write(&self.paths.main_script, source).expect("write main.js");
        self
    }

    /// Write the machine-id stand-in.
    pub fn with_machine_id(self, id: &str) -> Self {
        std::fs::write(self.machine_id_path(), format!("{id}\n")).expect("write machine-id");
        self
    }

    pub fn machine_id_path(&self) -> PathBuf {
        self.root.path().join("machine-id")
    }

    pub fn linux_profile(&self) -> Arc<dyn PlatformProfile> {
        Arc::new(LinuxProfile::new(self.paths.clone(), self.machine_id_path()))
    }

    pub fn windows_profile(&self) -> Arc<dyn PlatformProfile> {
        Arc::new(WindowsProfile::new(self.paths.clone()))
    }

    pub fn macos_profile(&self) -> Arc<dyn PlatformProfile> {
        Arc::new(MacOsProfile::new(self.paths.clone()))
    }

    /// Parsed config store.
    pub fn store(&self) -> serde_json::Value {
        read_json(&self.paths.config_store)
    }

    /// Elevated reset context for `profile` with fast termination settings
    /// and no running processes.
    pub fn context(&self, profile: Arc<dyn PlatformProfile>, dry_run: bool) -> ResetContext {
        let os = profile.os();
        ResetContext::new(
            Arc::new(fast_settings()),
            Platform::new(os, true),
            profile,
            Arc::new(Logger::new("test")),
            dry_run,
        )
        .with_executor(Arc::new(RecordingExecutor::default()))
        .with_process_table(Arc::new(NoProcesses))
    }
}

/// Settings with a zero termination budget and a short poll interval.
pub fn fast_settings() -> Settings {
    Settings {
        termination_timeout_secs: 0,
        poll_interval_ms: 10,
        ..Settings::default()
    }
}

pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).expect("read json")).expect("parse json")
}

/// Process table with nothing running.
#[derive(Debug, Default)]
pub struct NoProcesses;

impl ProcessTable for NoProcesses {
    fn find(&self, _names: &[String]) -> Vec<ProcessInfo> {
        Vec::new()
    }

    fn terminate(&self, _pid: u32) -> bool {
        true
    }
}

/// Registry stand-in. When `sticky` is set, reads keep returning the
/// original value regardless of writes.
#[derive(Debug)]
pub struct MemoryGuidStore {
    value: Mutex<String>,
    sticky: bool,
}

impl MemoryGuidStore {
    pub fn new(initial: &str) -> Self {
        Self {
            value: Mutex::new(initial.to_string()),
            sticky: false,
        }
    }

    pub fn sticky(initial: &str) -> Self {
        Self {
            sticky: true,
            ..Self::new(initial)
        }
    }

    pub fn current(&self) -> String {
        self.value.lock().expect("guid lock").clone()
    }
}

impl GuidStore for MemoryGuidStore {
    fn read(&self) -> std::io::Result<String> {
        Ok(self.current())
    }

    fn write(&self, value: &str) -> std::io::Result<()> {
        if !self.sticky {
            *self.value.lock().expect("guid lock") = value.to_string();
        }
        Ok(())
    }
}

/// Executor that records every command line and reports success.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, program: &str, args: &[&str]) -> ExecResult {
        let mut line = vec![program];
        line.extend_from_slice(args);
        self.calls.lock().expect("calls lock").push(line.join(" "));
        ExecResult {
            stdout: String::new(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }
}

impl Executor for RecordingExecutor {
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        Ok(self.record(program, args))
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        Ok(self.record(program, args))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        _input: &[u8],
        _on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> anyhow::Result<ExecResult> {
        Ok(self.record(program, args))
    }

    fn which(&self, _program: &str) -> bool {
        true
    }
}

//! Graceful termination of running application instances.
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ResetError, Result};
use crate::logging::Log;

/// A running process matched by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Operating-system process id.
    pub pid: u32,
    /// Executable name as reported by the OS.
    pub name: String,
}

/// View of the system process list.
pub trait ProcessTable: Send + Sync + std::fmt::Debug {
    /// Running processes whose name matches any of `names`, excluding the
    /// current process.
    fn find(&self, names: &[String]) -> Vec<ProcessInfo>;

    /// Ask `pid` to exit. Returns `false` if the request could not be sent.
    fn terminate(&self, pid: u32) -> bool;
}

/// Case-insensitive name match ignoring a trailing `.exe`.
#[must_use]
pub fn name_matches(process_name: &str, wanted: &str) -> bool {
    fn stem(name: &str) -> &str {
        let trimmed = name.trim();
        let len = trimmed.len();
        if len > 4 && trimmed.is_char_boundary(len - 4) {
            let (head, tail) = trimmed.split_at(len - 4);
            if tail.eq_ignore_ascii_case(".exe") {
                return head;
            }
        }
        trimmed
    }
    let wanted = stem(wanted);
    !wanted.is_empty() && stem(process_name).eq_ignore_ascii_case(wanted)
}

/// [`ProcessTable`] backed by `sysinfo`.
///
/// Unix processes receive `SIGTERM`; Windows processes get `taskkill`
/// without `/F`.
#[derive(Debug)]
pub struct SysinfoProcessTable {
    system: Mutex<sysinfo::System>,
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
        }
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn find(&self, names: &[String]) -> Vec<ProcessInfo> {
        let own = std::process::id();
        let Ok(mut system) = self.system.lock() else {
            return Vec::new();
        };
        system.refresh_processes();
        let mut found: Vec<ProcessInfo> = system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own)
            .filter(|(_, p)| names.iter().any(|n| name_matches(p.name(), n)))
            .map(|(pid, p)| ProcessInfo {
                pid: pid.as_u32(),
                name: p.name().to_string(),
            })
            .collect();
        found.sort_by_key(|p| p.pid);
        found
    }

    fn terminate(&self, pid: u32) -> bool {
        if cfg!(windows) {
            let pid = pid.to_string();
            return crate::exec::run_unchecked("taskkill", &["/PID", &pid])
                .is_ok_and(|r| r.success);
        }
        let Ok(system) = self.system.lock() else {
            return false;
        };
        system
            .process(sysinfo::Pid::from_u32(pid))
            .and_then(|p| p.kill_with(sysinfo::Signal::Term))
            .unwrap_or(false)
    }
}

/// Terminates target processes and waits for them to exit.
#[derive(Debug)]
pub struct ProcessGuard<'a> {
    table: &'a dyn ProcessTable,
    poll_interval: Duration,
    log: &'a dyn Log,
}

impl<'a> ProcessGuard<'a> {
    /// Create a guard polling `table` every `poll_interval`.
    #[must_use]
    pub const fn new(
        table: &'a dyn ProcessTable,
        poll_interval: Duration,
        log: &'a dyn Log,
    ) -> Self {
        Self {
            table,
            poll_interval,
            log,
        }
    }

    /// Running processes matching `names`.
    #[must_use]
    pub fn find(&self, names: &[String]) -> Vec<ProcessInfo> {
        self.table.find(names)
    }

    /// Send a graceful terminate to every process matching `process_names`
    /// and poll until none remain or `timeout` elapses. Never force-kills.
    ///
    /// Returns the ids of the processes that were asked to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::ProcessTerminationTimeout`] listing the
    /// processes still running when the timeout elapsed.
    pub fn terminate_all(&self, process_names: &[String], timeout: Duration) -> Result<Vec<u32>> {
        let targets = self.table.find(process_names);
        if targets.is_empty() {
            self.log.debug("no running instances found");
            return Ok(Vec::new());
        }

        for p in &targets {
            self.log.info(&format!("terminating {} (pid {})", p.name, p.pid));
            if !self.table.terminate(p.pid) {
                self.log.warn(&format!("could not signal {} (pid {})", p.name, p.pid));
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = self.table.find(process_names);
            if remaining.is_empty() {
                return Ok(targets.iter().map(|p| p.pid).collect());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ResetError::ProcessTerminationTimeout {
                    signalled: targets.iter().map(|p| p.pid).collect(),
                    remaining: remaining.iter().map(|p| p.pid).collect(),
                });
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;

    /// Process that exits `exit_after` after it is signalled (never if `None`).
    #[derive(Debug)]
    struct FakeTable {
        pid: u32,
        name: &'static str,
        exit_after: Option<Duration>,
        signalled: Mutex<Option<Instant>>,
    }

    impl FakeTable {
        fn new(exit_after: Option<Duration>) -> Self {
            Self {
                pid: 4242,
                name: "App",
                exit_after,
                signalled: Mutex::new(None),
            }
        }
    }

    impl ProcessTable for FakeTable {
        fn find(&self, names: &[String]) -> Vec<ProcessInfo> {
            let gone = match (*self.signalled.lock().unwrap(), self.exit_after) {
                (Some(at), Some(after)) => at.elapsed() >= after,
                _ => false,
            };
            if gone || !names.iter().any(|n| name_matches(self.name, n)) {
                return Vec::new();
            }
            vec![ProcessInfo {
                pid: self.pid,
                name: self.name.to_string(),
            }]
        }

        fn terminate(&self, _pid: u32) -> bool {
            *self.signalled.lock().unwrap() = Some(Instant::now());
            true
        }
    }

    #[test]
    fn name_matching_rules() {
        assert!(name_matches("Cursor", "cursor"));
        assert!(name_matches("Cursor.exe", "cursor"));
        assert!(name_matches("CURSOR.EXE", "Cursor.exe"));
        assert!(!name_matches("cursor-helper", "cursor"));
        assert!(!name_matches("cursor", ""));
    }

    #[test]
    fn process_exiting_after_two_seconds_succeeds_before_timeout() {
        let (log, _tmp, _guard) = isolated_logger();
        let table = FakeTable::new(Some(Duration::from_secs(2)));
        let guard = ProcessGuard::new(&table, Duration::from_millis(250), &log);

        let start = Instant::now();
        let pids = guard
            .terminate_all(&["app".to_string()], Duration::from_secs(5))
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(pids, vec![4242]);
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    }

    #[test]
    fn stubborn_process_times_out_with_pid() {
        let (log, _tmp, _guard) = isolated_logger();
        let table = FakeTable::new(None);
        let guard = ProcessGuard::new(&table, Duration::from_millis(50), &log);

        let err = guard
            .terminate_all(&["app".to_string()], Duration::from_millis(200))
            .unwrap_err();
        assert!(err.is_soft());
        assert!(matches!(
            &err,
            ResetError::ProcessTerminationTimeout { signalled, remaining }
                if signalled == &[4242] && remaining == &[4242]
        ));
    }

    #[test]
    fn nothing_running_returns_immediately() {
        let (log, _tmp, _guard) = isolated_logger();
        let table = FakeTable::new(None);
        let guard = ProcessGuard::new(&table, Duration::from_millis(50), &log);
        let pids = guard
            .terminate_all(&["other".to_string()], Duration::from_secs(5))
            .unwrap();
        assert!(pids.is_empty());
        assert!(table.signalled.lock().unwrap().is_none());
    }

    #[test]
    fn sysinfo_table_excludes_current_process() {
        let table = SysinfoProcessTable::default();
        let own = std::process::id();
        let names: Vec<String> = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .into_iter()
            .collect();
        assert!(table.find(&names).iter().all(|p| p.pid != own));
    }
}

//! External command execution behind an injectable [`Executor`] seam.
use anyhow::{Context, Result, anyhow, bail};
use std::io::{BufRead as _, BufReader, Read, Write as _};
use std::process::{Command, Output, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Which pipe a line of child output arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Abstraction over process spawning so engine steps can be unit-tested
/// without touching the real system.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command and return its output. Fails if the command exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command, allowing failure (returns result without bailing).
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command with `input` written to its stdin, handing each output
    /// line to `on_line` as it arrives. The full output is also returned.
    /// Does not bail on a non-zero exit; callers inspect
    /// [`ExecResult::success`].
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned, stdin cannot be
    /// written, or its output cannot be read.
    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<ExecResult>;

    /// Check if a program is available on PATH.
    fn which(&self, program: &str) -> bool;
}

/// Production [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        run(program, args)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        run_unchecked(program, args)
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<ExecResult> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute: {program}"))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut captured = (String::new(), String::new());

        // stdin is fed and both pipes are drained concurrently so neither side
        // can block on a full pipe buffer.
        let (written, read_out, read_err) = thread::scope(|s| {
            let writer = s.spawn(move || -> std::io::Result<()> {
                // Dropping the handle closes the pipe so the child sees EOF.
                let Some(mut stdin) = stdin else {
                    return Ok(());
                };
                match stdin.write_all(input) {
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            });
            let (tx, rx) = mpsc::channel();
            let out_tx = tx.clone();
            let out_reader = s.spawn(move || forward_lines(stdout, OutputStream::Stdout, &out_tx));
            let err_reader = s.spawn(move || forward_lines(stderr, OutputStream::Stderr, &tx));

            for (stream, line) in rx {
                let text = String::from_utf8_lossy(&line);
                on_line(stream, text.trim_end_matches(['\n', '\r']));
                match stream {
                    OutputStream::Stdout => captured.0.push_str(&text),
                    OutputStream::Stderr => captured.1.push_str(&text),
                }
            }
            (writer.join(), out_reader.join(), err_reader.join())
        });

        let status = child
            .wait()
            .with_context(|| format!("waiting for {program}"))?;
        let panicked = |_| anyhow!("i/o thread for {program} panicked");
        written
            .map_err(panicked)?
            .with_context(|| format!("writing stdin of {program}"))?;
        read_out
            .map_err(panicked)?
            .with_context(|| format!("reading stdout of {program}"))?;
        read_err
            .map_err(panicked)?
            .with_context(|| format!("reading stderr of {program}"))?;

        Ok(ExecResult {
            stdout: captured.0,
            stderr: captured.1,
            success: status.success(),
            code: status.code(),
        })
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Send each line read from `pipe` (newline included) to `tx`.
fn forward_lines(
    pipe: Option<impl Read>,
    stream: OutputStream,
    tx: &Sender<(OutputStream, Vec<u8>)>,
) -> std::io::Result<()> {
    let Some(pipe) = pipe else {
        return Ok(());
    };
    let mut reader = BufReader::new(pipe);
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        // The receiver only hangs up once the caller stops listening.
        if tx.send((stream, line)).is_err() {
            return Ok(());
        }
    }
}

/// Execute a command and return the result, bailing on non-zero exit.
fn execute_checked(mut cmd: Command, label: &str) -> Result<ExecResult> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to execute: {label}"))?;
    let result = ExecResult::from(output);
    if !result.success {
        bail!(
            "{label} failed (exit {}): {}",
            result.code.unwrap_or(-1),
            result.stderr.trim()
        );
    }
    Ok(result)
}

/// Run a command and return its output. Fails if the command exits non-zero.
///
/// # Errors
///
/// Returns an error if the program cannot be spawned or exits non-zero.
pub fn run(program: &str, args: &[&str]) -> Result<ExecResult> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    execute_checked(cmd, program)
}

/// Run a command, allowing failure (returns result without bailing).
///
/// # Errors
///
/// Returns an error only if the program cannot be spawned.
pub fn run_unchecked(program: &str, args: &[&str]) -> Result<ExecResult> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to execute: {program}"))?;

    Ok(ExecResult::from(output))
}

/// Shared test helpers for modules that take an [`Executor`].
#[cfg(test)]
pub mod test_helpers {
    use super::{ExecResult, Executor, OutputStream};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A configurable mock executor.
    ///
    /// Maintains a queue of `(success, stdout)` responses consumed in FIFO
    /// order.  When the queue is empty any call returns a failed response.
    /// Every invocation is recorded as `"program arg1 arg2"` for assertions.
    #[derive(Debug, Default)]
    pub struct MockExecutor {
        responses: Mutex<VecDeque<(bool, String)>>,
        which_result: bool,
        calls: Mutex<Vec<String>>,
        inputs: Mutex<Vec<Vec<u8>>>,
    }

    impl MockExecutor {
        /// Create a mock from an ordered list of `(success, stdout)` pairs.
        #[must_use]
        pub fn with_responses(responses: Vec<(bool, String)>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        /// Set the value returned by every [`Executor::which`] call.
        #[must_use]
        pub fn with_which(mut self, result: bool) -> Self {
            self.which_result = result;
            self
        }

        /// Recorded command lines, in call order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map_or_else(|_| vec![], |g| g.clone())
        }

        /// Recorded stdin payloads from [`Executor::run_with_input`].
        pub fn inputs(&self) -> Vec<Vec<u8>> {
            self.inputs.lock().map_or_else(|_| vec![], |g| g.clone())
        }

        fn next(&self, program: &str, args: &[&str]) -> ExecResult {
            if let Ok(mut calls) = self.calls.lock() {
                let mut line = program.to_string();
                for arg in args {
                    line.push(' ');
                    line.push_str(arg);
                }
                calls.push(line);
            }
            let (success, stdout) = self.responses.lock().map_or_else(
                |_| (false, "mutex poisoned".to_string()),
                |mut guard| {
                    guard
                        .pop_front()
                        .unwrap_or_else(|| (false, "unexpected call".to_string()))
                },
            );
            ExecResult {
                stdout,
                stderr: String::new(),
                success,
                code: Some(i32::from(!success)),
            }
        }
    }

    impl Executor for MockExecutor {
        fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
            let result = self.next(program, args);
            if result.success {
                Ok(result)
            } else {
                anyhow::bail!("mock command failed: {program}")
            }
        }

        fn run_unchecked(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
            Ok(self.next(program, args))
        }

        fn run_with_input(
            &self,
            program: &str,
            args: &[&str],
            input: &[u8],
            on_line: &mut dyn FnMut(OutputStream, &str),
        ) -> anyhow::Result<ExecResult> {
            if let Ok(mut inputs) = self.inputs.lock() {
                inputs.push(input.to_vec());
            }
            let result = self.next(program, args);
            for line in result.stdout.lines() {
                on_line(OutputStream::Stdout, line);
            }
            Ok(result)
        }

        fn which(&self, _: &str) -> bool {
            self.which_result
        }
    }
}

//! Log file location, rotation, ANSI stripping, and time formatting.
use std::fs;
use std::path::{Path, PathBuf};

/// Size above which a log file is rotated to `<name>.1` before a new run.
pub(super) const MAX_LOG_BYTES: u64 = 1024 * 1024;

/// Strip ANSI escape sequences from a string.
///
/// Handles SGR sequences (ending in `m`) and other CSI sequences (ending
/// in any letter in the `@`..`~` range). Reset scripts colour their output,
/// and the log file should stay plain text.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if let Some(next) = chars.next()
                && next == '['
            {
                for inner in chars.by_ref() {
                    if ('@'..='~').contains(&inner) {
                        break;
                    }
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Base directory for cached state, resolved through `env`.
///
/// Order: `XDG_CACHE_HOME`, `LOCALAPPDATA` (Windows), `$HOME/.cache`,
/// `%USERPROFILE%\.cache`, then the working directory.
pub(super) fn cache_base(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    let non_empty = |key: &str| env(key).filter(|v| !v.is_empty());
    if let Some(dir) = non_empty("XDG_CACHE_HOME").or_else(|| non_empty("LOCALAPPDATA")) {
        return PathBuf::from(dir);
    }
    non_empty("HOME")
        .or_else(|| non_empty("USERPROFILE"))
        .map_or_else(|| PathBuf::from("."), |home| PathBuf::from(home).join(".cache"))
}

/// Return the `idreset` cache directory, creating it if needed.
pub(super) fn cache_dir() -> Option<PathBuf> {
    let dir = cache_base(&|key| std::env::var(key).ok()).join("idreset");
    fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Return the log file path for `command` inside [`cache_dir`].
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    Some(cache_dir()?.join(format!("{command}.log")))
}

/// Move `path` to `<path>.1` once it exceeds `max_bytes`, replacing any
/// previous rotation. Runs append to the same file until then, so the
/// identifiers written by earlier resets stay on record.
pub(super) fn rotate_if_large(path: &Path, max_bytes: u64) {
    let Ok(meta) = fs::metadata(path) else {
        return;
    };
    if meta.len() <= max_bytes {
        return;
    }
    let mut rotated = path.as_os_str().to_os_string();
    rotated.push(".1");
    fs::rename(path, rotated).ok();
}

/// Format the current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub(super) fn format_utc_datetime() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format the current UTC time as `HH:MM:SS`.
pub(super) fn format_utc_time() -> String {
    chrono::Utc::now().format("%H:%M:%S").to_string()
}

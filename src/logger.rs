//! Run log for the editor and the batch CLI.
//!
//! One file per run, truncated at startup:
//!   Windows:  `%APPDATA%\EpanouiDent\epanouident.log`
//!   Linux:    `$XDG_DATA_HOME/EpanouiDent/epanouident.log` or `~/.local/share/...`
//!   macOS:    `~/Library/Application Support/EpanouiDent/epanouident.log`
//!
//! `EPANOUIDENT_LOG_DIR` replaces the directory, e.g. for a clinic share.
//!
//! Until `init()` has run (unit tests, library use) `log_info!`, `log_warn!`
//! and `log_err!` write nothing, unless the stderr echo is on.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const LOG_DIR_ENV: &str = "EPANOUIDENT_LOG_DIR";

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static ECHO_STDERR: OnceLock<bool> = OnceLock::new();

pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Append `line` to the log and, with `--verbose`, to stderr. I/O errors are
/// dropped.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
    if ECHO_STDERR.get().copied().unwrap_or(false) {
        eprintln!("{}", line);
    }
}

pub fn write(level: &str, msg: &str) {
    write_line(&format!("[{}] [{}] {}", clock(since_epoch()), level, msg));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write("INFO", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write("WARN", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write("ERROR", &format!($($arg)*))
    };
}

/// Mirror every log line to stderr. First call wins.
pub fn echo_to_stderr(enabled: bool) {
    let _ = ECHO_STDERR.set(enabled);
}

/// Truncate the run log, write the run header and route panics into the log.
pub fn init() {
    let path = log_dir().join("epanouident.log");
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => {
            let _ = LOG_PATH.set(path.clone());
            let _ = LOG_FILE.set(Mutex::new(f));
        }
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    }

    write_line(&format!(
        "=== EpanouiDent {} ({}/{}) started at unix {} ===",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
        since_epoch().as_secs()
    ));
    write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", clock(since_epoch()), info));
        prev(info);
    }));
}

fn log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    data_dir().join("EpanouiDent")
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn since_epoch() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// `HH:MM:SS.mmm` within the UTC day.
fn clock(t: Duration) -> String {
    let secs = t.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60,
        t.subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_wraps_at_midnight() {
        assert_eq!(clock(Duration::from_millis(0)), "00:00:00.000");
        let t = Duration::from_secs(86_400 * 3 + 13 * 3_600 + 5 * 60 + 9) + Duration::from_millis(42);
        assert_eq!(clock(t), "13:05:09.042");
    }
}

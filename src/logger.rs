//! Session log.
//!
//! A GUI session writes to `<data dir>/Osmosis/osmosis.log`, replaced at every
//! launch. The CLI keeps quiet unless `--verbose` routes lines to stderr.
//! Until one of the two is configured every line is dropped, which is what
//! unit tests and library callers get.
//!
//! Lines carry the time since the session started rather than wall-clock
//! time, so a load or an export can be timed straight from the log.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Folder name under the platform data directory.
pub const APP_DIR: &str = "Osmosis";
const LOG_FILE: &str = "osmosis.log";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

enum Target {
    File(File),
    Stderr,
}

struct Session {
    target: Target,
    started: Instant,
}

static SESSION: OnceLock<Mutex<Session>> = OnceLock::new();

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Error, format_args!($($arg)*))
    };
}

/// `  12.345s WARN  message`
pub fn format_line(level: Level, elapsed: Duration, msg: fmt::Arguments<'_>) -> String {
    let ms = elapsed.as_millis();
    format!("{:>5}.{:03}s {:<5} {}", ms / 1000, ms % 1000, level.tag(), msg)
}

/// Append one line to the session target, if any.  I/O failures are ignored.
pub fn record(level: Level, msg: fmt::Arguments<'_>) {
    let Some(session) = SESSION.get() else { return };
    let Ok(mut s) = session.lock() else { return };
    let line = format_line(level, s.started.elapsed(), msg);
    match &mut s.target {
        Target::File(f) => {
            let _ = writeln!(f, "{}", line);
        }
        Target::Stderr => eprintln!("{}", line),
    }
}

fn install(target: Target) -> bool {
    SESSION
        .set(Mutex::new(Session { target, started: Instant::now() }))
        .is_ok()
}

/// Route the CLI's log lines to stderr when `enabled`.
pub fn echo_to_stderr(enabled: bool) {
    if enabled {
        install(Target::Stderr);
    }
}

/// Open the GUI session log and mirror panics into it.  Returns the log path.
pub fn init() -> Option<PathBuf> {
    let dir = app_dir();
    let path = dir.join(LOG_FILE);
    let file = fs::create_dir_all(&dir).and_then(|_| File::create(&path));
    match file {
        Ok(f) => {
            if !install(Target::File(f)) {
                return None;
            }
        }
        Err(e) => {
            eprintln!("osmosis: cannot open {}: {}", path.display(), e);
            return None;
        }
    }
    crate::log_info!("Osmosis {} session, log at {}", env!("CARGO_PKG_VERSION"), path.display());

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        record(Level::Error, format_args!("panic: {}", info));
        default_hook(info);
    }));
    Some(path)
}

/// `<data dir>/Osmosis`, home of the log and the settings file.
pub fn app_dir() -> PathBuf {
    data_dir().join(APP_DIR)
}

fn data_dir() -> PathBuf {
    let var = |k: &str| std::env::var_os(k).map(PathBuf::from);
    if cfg!(target_os = "windows")
        && let Some(p) = var("APPDATA")
    {
        return p;
    }
    if cfg!(target_os = "macos")
        && let Some(home) = var("HOME")
    {
        return home.join("Library/Application Support");
    }
    var("XDG_DATA_HOME")
        .or_else(|| var("HOME").map(|h| h.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_shows_elapsed_seconds_and_level() {
        let line = format_line(Level::Warn, Duration::from_millis(12_345), format_args!("stale load #{}", 3));
        assert_eq!(line, "   12.345s WARN  stale load #3");
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(Level::Info < Level::Warn && Level::Warn < Level::Error);
    }

    #[test]
    fn app_dir_ends_in_app_folder() {
        assert!(app_dir().ends_with(APP_DIR));
    }
}

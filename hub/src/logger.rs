//! Logging facade
//!
//! Call sites use `log_info`/`log_debug`/`log_error` with a short context tag,
//! which becomes the `ctx` field of the underlying `tracing` event. `init`
//! installs a daily-rolling file subscriber in the app logs directory; until
//! then events go to whatever subscriber the host process installed (tests
//! usually install none).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::common::app_dirs;

const LOG_FILE_PREFIX: &str = "vatacars-hub.log";
const DEFAULT_FILTER: &str = "vatacars_hub_lib=info";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Install the file subscriber. Safe to call more than once; later calls are ignored.
pub fn init(data_dir: &Path) -> anyhow::Result<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let log_dir = app_dirs::logs_dir(data_dir);
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;

    let _ = LOG_GUARD.set(guard);
    let _ = LOG_DIR.set(log_dir);
    Ok(())
}

pub fn log_info(message: &str, context: Option<&str>) {
    tracing::info!(ctx = context.unwrap_or("app"), "{}", message);
}

pub fn log_warn(message: &str, context: Option<&str>) {
    tracing::warn!(ctx = context.unwrap_or("app"), "{}", message);
}

pub fn log_error(message: &str, context: Option<&str>) {
    tracing::error!(ctx = context.unwrap_or("app"), "{}", message);
}

/// Debug-level event; `file` records the emitting source file when known
pub fn log_debug(message: &str, context: Option<&str>, file: Option<&str>) {
    match file {
        Some(file) => {
            tracing::debug!(ctx = context.unwrap_or("app"), file = file, "{}", message)
        }
        None => tracing::debug!(ctx = context.unwrap_or("app"), "{}", message),
    }
}

/// Debug log with the calling file attached
#[macro_export]
macro_rules! log_debug {
    ($msg:expr, $ctx:expr) => {
        $crate::logger::log_debug($msg, Some($ctx), Some(file!()))
    };
}

/// Directory holding the rolling log files, if logging was initialised
pub fn get_log_folder() -> Option<PathBuf> {
    LOG_DIR.get().cloned()
}

/// Most recent log file in the folder
pub fn get_log_path() -> Option<PathBuf> {
    let dir = get_log_folder()?;
    latest_log_file(&dir)
}

fn latest_log_file(dir: &Path) -> Option<PathBuf> {
    // Daily rotation names files `<prefix>.YYYY-MM-DD`, so name order is date order
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .collect();
    files.sort();
    files.pop()
}

/// Last `lines` lines of the current log file, oldest first
pub fn get_recent_logs(lines: usize) -> Vec<String> {
    match get_log_path() {
        Some(path) => tail_lines(&path, lines),
        None => Vec::new(),
    }
}

fn tail_lines(path: &Path, lines: usize) -> Vec<String> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].iter().map(|s| s.to_string()).collect()
}

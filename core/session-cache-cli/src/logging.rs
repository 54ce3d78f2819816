//! Tracing set-up for the CLI.
//!
//! Logs go to stderr so stdout stays machine-readable. When
//! `VALIDATOR_SESSION_CACHE_LOG_DIR` is set, they go to a daily-rolling file in
//! that directory instead.

use std::env;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "VALIDATOR_SESSION_CACHE_DEBUG_LOG";
const LOG_DIR_ENV: &str = "VALIDATOR_SESSION_CACHE_LOG_DIR";
const LOG_FILE_PREFIX: &str = "validator-sessions.log";

/// Installs the global subscriber. Keep the guard alive until exit so the
/// file writer flushes.
pub fn init() -> Option<WorkerGuard> {
    let filter = env_filter();

    if let Some(dir) = log_dir() {
        match fs_err::create_dir_all(&dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(writer)
                    .init();
                return Some(guard);
            }
            Err(err) => {
                eprintln!("validator-sessions: log dir unavailable, using stderr: {err}");
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    None
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn log_dir() -> Option<PathBuf> {
    env::var_os(LOG_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

//! Tracing setup for the server and the operator CLI.
//!
//! Events go to stdout and, unless disabled, to a log file written through a non-blocking
//! appender. `KB_LOG_FILE` names the file (`off` disables it); otherwise events are appended to
//! `logs/kbcore.log`. `RUST_LOG` controls the filter and defaults to `info`.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_NAME: &str = "kbcore.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where file logging goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFile {
    /// File logging disabled.
    Disabled,
    /// Explicit file path.
    Path(PathBuf),
    /// Default rolling-never appender under `logs/`.
    Default,
}

impl LogFile {
    /// Interpret the value of `KB_LOG_FILE`.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Default,
            Some(v) if v.eq_ignore_ascii_case("off") || v.eq_ignore_ascii_case("none") => {
                Self::Disabled
            }
            Some(v) => Self::Path(PathBuf::from(v)),
        }
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let setting = std::env::var("KB_LOG_FILE").ok();
    let writer = file_writer(&LogFile::from_setting(setting.as_deref()));

    let file_layer = writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .compact()
    });
    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init();

    if let Err(err) = result {
        eprintln!("Tracing already initialized: {err}");
    }
}

fn file_writer(target: &LogFile) -> Option<NonBlocking> {
    let (writer, guard) = match target {
        LogFile::Disabled => return None,
        LogFile::Path(path) => match open_append(path) {
            Ok(file) => tracing_appender::non_blocking(file),
            Err(err) => {
                eprintln!("Log file {} unavailable: {err}", path.display());
                return None;
            }
        },
        LogFile::Default => {
            if let Err(err) = std::fs::create_dir_all(DEFAULT_LOG_DIR) {
                eprintln!("Log directory {DEFAULT_LOG_DIR} unavailable: {err}");
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::never(
                DEFAULT_LOG_DIR,
                DEFAULT_LOG_NAME,
            ))
        }
    };
    // The first guard wins; dropping a later one only flushes its own writer.
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

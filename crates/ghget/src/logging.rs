//! Logging setup for the worker.
//!
//! Events go to stderr and to a daily-rolling `ghget.log` under the logs
//! directory. Files older than the retention window are removed at start-up.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_FILE_PREFIX: &str = "ghget.log";

/// Removes rolled log files last modified more than `retention_days` ago.
pub fn prune_old_logs(dir: &Path, retention_days: u32) -> io::Result<u32> {
    if !dir.exists() {
        return Ok(0);
    }

    let retention = Duration::from_secs(u64::from(retention_days) * 24 * 3600);
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(LOG_FILE_PREFIX) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > retention) && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
///
/// The returned guard flushes the file writer when dropped and must live
/// until the process exits.
pub fn init(level: &str, dir: &Path, retention_days: u32) -> Result<WorkerGuard> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let removed = prune_old_logs(dir, retention_days)?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
    let stderr_layer = fmt::layer().compact().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("failed to install the log subscriber")?;

    tracing::debug!(dir = %dir.display(), level, retention_days, "logging initialized");
    if removed > 0 {
        tracing::info!(removed, "removed expired log files");
    }
    Ok(guard)
}

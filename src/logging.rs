//! Logging setup and log-file housekeeping.
//!
//! This module provides:
//! - A tracing subscriber writing to the console and to a rolling file
//!   (rolled daily and whenever it reaches a size cap, a fixed number of
//!   rolled files kept)
//! - Local timezone timestamps for both outputs
//! - Age-based log retention, run by the scheduler alongside heartbeats

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::Local;
use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default log filter directive, overridable through `RUST_LOG`.
pub const DEFAULT_LOG_FILTER: &str = "video_herald=info,reqwest=warn";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Timer that stamps log lines in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Size and count limits for the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotation {
    pub max_bytes: u64,
    /// Rolled files kept next to the active one.
    pub max_files: usize,
}

/// Open `<log_dir>/<file_prefix>`, rolled to `<file_prefix>.1`, `.2`, ...
/// daily or once it reaches `rotation.max_bytes`.
pub fn file_appender(
    log_dir: &Path,
    file_prefix: &str,
    rotation: LogRotation,
) -> Result<BasicRollingFileAppender> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let condition = RollingConditionBasic::new()
        .daily()
        .max_size(rotation.max_bytes);
    BasicRollingFileAppender::new(log_dir.join(file_prefix), condition, rotation.max_files)
        .with_context(|| format!("failed to open log file in {}", log_dir.display()))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the whole process or buffered lines are
/// lost on exit.
pub fn init_logging(
    log_dir: &Path,
    file_prefix: &str,
    rotation: LogRotation,
) -> Result<WorkerGuard> {
    let (non_blocking, guard) =
        tracing_appender::non_blocking(file_appender(log_dir, file_prefix, rotation)?);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .context("failed to install the tracing subscriber")?;

    Ok(guard)
}

/// Which log files to prune and how old they may get.
#[derive(Debug, Clone)]
pub struct LogRetention {
    pub dir: PathBuf,
    pub prefix: String,
    pub days: u32,
}

impl LogRetention {
    /// Prune old files now.  Failures are logged; returns the number removed.
    pub async fn run(&self) -> usize {
        match cleanup_old_logs(&self.dir, &self.prefix, self.days, SystemTime::now()).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to clean up old logs");
                0
            }
        }
    }
}

/// Delete files in `log_dir` whose name starts with `prefix` and whose
/// modification time is more than `retention_days` before `now`.
///
/// The active file (named exactly `prefix`) is held open by the appender and
/// is never removed.
///
/// A file that cannot be inspected or removed is logged and skipped.
pub async fn cleanup_old_logs(
    log_dir: &Path,
    prefix: &str,
    retention_days: u32,
    now: SystemTime,
) -> io::Result<usize> {
    let max_age = Duration::from_secs(u64::from(retention_days) * SECONDS_PER_DAY);
    let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        let matches_prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(prefix) && name != prefix);
        if !matches_prefix {
            continue;
        }

        let modified = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta.modified(),
            Ok(_) => continue,
            Err(e) => Err(e),
        };
        let modified = match modified {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read log file age");
                continue;
            }
        };

        if modified < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

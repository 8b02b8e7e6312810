use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_LEVEL_ENV: &str = "AGILE_BOARD_LOG_LEVEL";
const LOG_FILE_PREFIX: &str = "agile-board";
const LOG_FILE_SUFFIX: &str = "log";
const MAX_LOG_FILES: usize = 14;

/// Installs the file subscriber. Queued events are flushed when the returned
/// guard drops, so hold it until the process is about to exit.
pub fn init_logging() -> Result<WorkerGuard> {
    let log_dir = get_log_directory()?;
    let appender = build_file_appender(&log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let level = std::env::var(LOG_LEVEL_ENV).ok();
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter_directives(level.as_deref())))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::info!("Logging initialized. Log directory: {}", log_dir.display());

    Ok(guard)
}

/// Daily-rotated `agile-board.<date>.log`, appended to by every run and
/// pruned to the newest [`MAX_LOG_FILES`].
fn build_file_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory '{}'", log_dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .with_context(|| format!("failed to open log files in '{}'", log_dir.display()))
}

fn filter_directives(raw_level: Option<&str>) -> String {
    let level = raw_level.and_then(normalize_log_level).unwrap_or("warn");
    format!("{level},agile_board={level}")
}

fn normalize_log_level(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

pub fn get_log_directory() -> Result<PathBuf> {
    let data_dir =
        dirs::data_local_dir().ok_or_else(|| anyhow!("failed to determine local data directory"))?;
    Ok(data_dir.join("agile-board").join("logs"))
}

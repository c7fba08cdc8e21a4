use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

const LOG_FILE_PREFIX: &str = "device-state-monitor.log";

pub struct LoggingConfig {
    pub level: Level,
    pub file_output: bool,
    pub console_output: bool,
    pub log_dir: Option<PathBuf>,
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: true,
            console_output: true,
            log_dir: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Console-only logging, used by the one-shot CLI commands.
    pub fn console(level: Level) -> Self {
        Self {
            level,
            file_output: false,
            ..Self::default()
        }
    }
}

/// Parses a `log_level` config value, falling back to info.
pub fn parse_level(value: &str) -> Level {
    Level::from_str(value.trim()).unwrap_or(Level::INFO)
}

/// Initialize logging with daily file rotation and optional JSON output
///
/// Returns the appender guard (keep it alive for the process lifetime) and
/// the directory logs are written to.
pub fn initialize_logging(config: LoggingConfig) -> Result<(Option<WorkerGuard>, Option<PathBuf>)> {
    let mut layers = Vec::new();
    let mut guard = None;

    // RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "device_state_monitor={}",
            config.level.as_str().to_lowercase()
        ))
    });

    if config.console_output {
        let console_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr)
                .boxed()
        } else {
            fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_writer(std::io::stderr)
                .boxed()
        };
        layers.push(console_layer);
    }

    let log_dir = if config.file_output {
        let dir = match config.log_dir.clone() {
            Some(dir) => dir,
            None => get_default_log_dir()?,
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let file_appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let file_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(non_blocking)
                .boxed()
        } else {
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(non_blocking)
                .boxed()
        };
        layers.push(file_layer);

        Some(dir)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok((guard, log_dir))
}

pub fn get_default_log_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home_dir.join(".local/share/device-state-monitor/logs"))
}

/// Remove rotated log files last modified more than `keep_days` ago.
///
/// Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &Path, keep_days: u64) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff_time = SystemTime::now()
        .checked_sub(Duration::from_secs(60 * 60 * 24 * keep_days))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let entries = std::fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {}", log_dir.display()))?;
    let mut cleaned_count = 0;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() || !is_log_file(&path) {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified >= cutoff_time {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                cleaned_count += 1;
                tracing::debug!("Removed old log file: {}", path.display());
            }
            Err(e) => tracing::warn!("Failed to remove old log file {}: {}", path.display(), e),
        }
    }

    if cleaned_count > 0 {
        tracing::info!(
            "Cleaned up {} old log files from {}",
            cleaned_count,
            log_dir.display()
        );
    }

    Ok(cleaned_count)
}

/// Rotated files are named `<prefix>.<date>`, plain `.log` files also count.
fn is_log_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(LOG_FILE_PREFIX) || path.extension().is_some_and(|ext| ext == "log")
}

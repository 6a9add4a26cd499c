//! Logging setup
//!
//! Console output plus a daily file `<LOG_DIR>/<name>_<YYYYMMDD>.log`.
//! `RUST_LOG` overrides the filter built from `LOG_LEVEL`.

use crate::config::LoggingConfig;
use chrono::NaiveDate;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Map a `LOG_LEVEL` value (DEBUG, INFO, WARNING, ERROR, CRITICAL) to a
/// tracing level name; unknown values fall back to info
pub fn tracing_level(level: &str) -> &'static str {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" | "FATAL" => "error",
        _ => "info",
    }
}

/// Default filter directive for the bridge and its HTTP layer
pub fn filter_directive(level: &str) -> String {
    let level = tracing_level(level);
    format!("tv_mt5_bridge={level},tower_http={level}")
}

/// Daily log file for a component
pub fn log_file_path(dir: &Path, name: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}_{}.log", name, date.format("%Y%m%d")))
}

fn open_log_file(dir: &Path, name: &str) -> std::io::Result<(File, PathBuf)> {
    fs::create_dir_all(dir)?;
    let path = log_file_path(dir, name, chrono::Local::now().date_naive());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((file, path))
}

/// Install the global subscriber. Returns the log file in use, or `None`
/// when only console logging could be set up.
pub fn init(config: &LoggingConfig, name: &str) -> Option<PathBuf> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_directive(&config.level).into())
    };

    let (file_layer, file_result) = match open_log_file(&config.dir, name) {
        Ok((file, path)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(filter()),
            ),
            Ok(path),
        ),
        Err(e) => (None, Err(e)),
    };

    let installed = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .try_init()
        .is_ok();

    match file_result {
        Ok(path) => {
            if installed {
                tracing::info!("Logging to {}", path.display());
            }
            Some(path)
        }
        Err(e) => {
            tracing::warn!(
                "Could not open log file in {}: {}. Logging to console only",
                config.dir.display(),
                e
            );
            None
        }
    }
}

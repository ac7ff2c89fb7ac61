//! tracing setup: console on stderr plus an optional append-only log file.
//!
//! The file is opened once in append mode and never reopened or rotated by
//! the daemon. External rotation must truncate in place (logrotate
//! `copytruncate`); a renamed file keeps receiving writes.

use crate::error::{ConfigError, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Builds the filter: `RUST_LOG` wins, otherwise `level`.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| ConfigError::invalid("logging.level", e.to_string()).into())
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber.
///
/// A log file that cannot be opened is reported once on the console and
/// otherwise ignored.
pub fn init_logging(level: &str, file: Option<&Path>) -> Result<()> {
    let filter = build_filter(level)?;

    let (file, file_error) = match file.map(|p| (p, open_log_file(p))) {
        Some((_, Ok(f))) => (Some(f), None),
        Some((p, Err(e))) => (None, Some((p.display().to_string(), e))),
        None => (None, None),
    };

    let file_layer = file.map(|f| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(f))
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        debug!("Global subscriber already installed");
    }
    if let Some((path, e)) = file_error {
        warn!(path = %path, error = %e, "Cannot open log file, logging to console only");
    }
    Ok(())
}

//! Logging initialization.
//!
//! Structured logging through tracing; JSON for production, pretty for
//! development, optionally written to a file.

use crate::config::LoggingConfig;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Flushes the non-blocking file writer; must outlive the process's logging.
static LOG_GUARD: Mutex<Option<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(None);

/// Initialize logging from the node configuration.
pub fn init_from_config(config: &LoggingConfig) -> anyhow::Result<()> {
    let json = config.format == "json";
    match &config.log_file {
        Some(path) => init_telemetry_with_file(&config.level, path, json),
        None => init_telemetry(&config.level, json),
    }
}

/// Initialize logging to stdout.
pub fn init_telemetry(log_level: &str, json_format: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_level)?;

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

/// Initialize logging to an append-only file.
pub fn init_telemetry_with_file(
    log_level: &str,
    log_file: &Path,
    json_format: bool,
) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_level)?;

    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(non_blocking))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .try_init()?;
    }

    if let Ok(mut g) = LOG_GUARD.lock() {
        *g = Some(guard);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        assert!(init_telemetry("guardian=loudest", false).is_err());
    }

    #[test]
    fn test_init_telemetry() {
        // A second global subscriber is refused; either outcome is fine here.
        let _ = init_telemetry("info", false);
    }
}

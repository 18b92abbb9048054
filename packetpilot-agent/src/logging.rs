//! Logging setup
//!
//! Installs a `tracing` subscriber writing to stdout and, when configured,
//! appending to a log file as well.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::error::ConfigError;

pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}

/// Install the global subscriber
pub fn init(level: &str, file: Option<&Path>) -> Result<(), ConfigError> {
    let level = parse_level(level)?;

    let stdout = tracing_subscriber::fmt::layer().with_filter(level);

    let file_layer = match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|source| ConfigError::LogFile {
                        path: path.to_path_buf(),
                        source,
                    })?;
                }
            }
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ConfigError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;

            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(log_file))
                    .with_filter(level),
            )
        }
        None => None,
    };

    // A subscriber may already be installed (tests, embedding)
    tracing_subscriber::registry()
        .with(stdout)
        .with(file_layer)
        .try_init()
        .ok();

    Ok(())
}

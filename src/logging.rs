//! Tracing subscriber setup
//!
//! Console output goes to stdout or stderr, and every run can also write a
//! plain-text log file named after its start time.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{Console, LoggingConfig};

/// Log file path for a run started now
pub fn log_file_path(dir: &Path, filename_format: &str) -> Result<PathBuf> {
    let mut name = String::new();
    write!(name, "{}", Local::now().format(filename_format))
        .map_err(|_| anyhow!("Invalid log filename_format: {}", filename_format))?;
    name.push_str(".log");
    Ok(dir.join(name))
}

/// Install the global subscriber
///
/// RUST_LOG takes precedence over the configured level. Returns the log file
/// path when file logging is enabled.
pub fn init(config: &LoggingConfig) -> Result<Option<PathBuf>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level: {}", config.level))?,
    };

    let console = match config.console {
        Console::Stdout => Some(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stdout)
                .boxed(),
        ),
        Console::Stderr => Some(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        ),
        Console::None => None,
    };

    let (file_layer, log_path) = match &config.logs_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
            let path = log_file_path(dir, &config.filename_format)?;
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path() {
        let path = log_file_path(Path::new("logs"), "%Y").unwrap();
        assert_eq!(path.parent(), Some(Path::new("logs")));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "2026.log".len());
    }
}

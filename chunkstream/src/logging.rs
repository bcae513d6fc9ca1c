//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events. Binaries call [`init_logging`]
//! once at startup to route them to stderr and, optionally, to a log file.
//! The returned [`LoggingGuard`] flushes the file writer when dropped, so it
//! must be held for the lifetime of the process.

use std::path::PathBuf;

use thiserror::Error;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "chunkstream=info";

/// Logging configuration.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: String,

    /// Optional file that receives a copy of every event (without ANSI colours).
    pub file: Option<PathBuf>,

    /// Whether stderr output uses ANSI colours.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_LOG_FILTER.to_string(),
            file: None,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Write a copy of the log to `path`.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Override the default filter directive.
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive could not be parsed.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// The log file path has no file name component.
    #[error("Invalid log file path: {0}")]
    FilePath(PathBuf),

    /// A global subscriber was already installed.
    #[error("Failed to install subscriber: {0}")]
    Install(String),
}

/// Keeps the non-blocking file writer alive.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global tracing subscriber.
pub fn init_logging(config: LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.default_filter)
            .map_err(|e| LoggingError::Filter(e.to_string()))?,
    };

    let timer = LocalTime::new(format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_timer(timer.clone())
        .with_target(true);

    let (file_layer, file_guard) = match &config.file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::FilePath(path.clone()))?;
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(LoggingGuard { _file: file_guard })
}

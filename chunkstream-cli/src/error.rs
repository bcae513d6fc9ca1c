//! CLI error type.

use std::path::PathBuf;

use chunkstream::app::AppError;
use chunkstream::config::ConfigError;
use chunkstream::logging::LoggingError;
use chunkstream::pool::PoolError;
use thiserror::Error;

/// Errors reported by CLI commands. Printed by `main` before exiting with
/// status 1.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initialize logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("{0}")]
    Pool(#[from] PoolError),

    #[error("{0}")]
    App(#[from] AppError),

    #[error("Failed to create Tokio runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Failed to set signal handler: {0}")]
    Signal(String),

    #[error("Config file not found: {}", .0.display())]
    MissingFile(PathBuf),
}

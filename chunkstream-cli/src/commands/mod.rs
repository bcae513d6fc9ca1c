//! CLI command implementations.

pub mod config;
pub mod seed;
pub mod simulate;

use std::path::Path;

use chunkstream::config::StreamingConfig;

use crate::error::CliError;

/// Loads `path` if given, otherwise the defaults.
pub fn load_config(path: Option<&Path>) -> Result<StreamingConfig, CliError> {
    match path {
        Some(path) if !path.exists() => Err(CliError::MissingFile(path.to_path_buf())),
        Some(path) => Ok(StreamingConfig::load(path)?),
        None => Ok(StreamingConfig::default()),
    }
}

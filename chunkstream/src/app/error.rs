//! Application error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::pool::PoolError;

/// Errors that can occur during application lifecycle.
#[derive(Debug, Error)]
pub enum AppError {
    /// The configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The pool registry cannot serve the generator.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// A background loop panicked or was aborted.
    #[error("Background task '{name}' failed: {reason}")]
    Join { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::EntityKind;

    #[test]
    fn test_app_error_display() {
        let err = AppError::from(ConfigError::Invalid("missing pool".to_string()));
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("missing pool"));
    }

    #[test]
    fn test_app_error_from_pool_error() {
        let err: AppError = PoolError::Unregistered(EntityKind::TREE).into();
        assert!(matches!(err, AppError::Pool(PoolError::Unregistered(_))));
        assert!(err.to_string().contains("tree"));
    }
}

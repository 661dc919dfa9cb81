//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_failures_name_their_source() {
        let err: ApiError = ConfigError::MissingVar("OPENAI_API_KEY".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing the environment variable OPENAI_API_KEY"
        );
        let err: ApiError = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken").into();
        assert!(matches!(err, ApiError::Io(_)));
    }
}

//! Error types shared across the delivery core
//!
//! One enum wraps every failure mode the store and dispatcher can surface.

use thiserror::Error;

/// Main error type for webhook delivery operations
#[derive(Debug, Error)]
pub enum Error {
    /// Database errors (Postgres via sqlx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The referenced record exists but is no longer usable
    #[error("Gone: {0}")]
    Gone(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store could not be reached; caller should back off and retry
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A durable invariant was violated (e.g. duplicate attempt log row)
    #[error("Invariant violation: {0}")]
    Conflict(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for webhook delivery operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("url must be http(s)".to_string());
        assert_eq!(err.to_string(), "Validation error: url must be http(s)");
    }

    #[test]
    fn test_error_conversion() {
        let sql_err = sqlx::Error::RowNotFound;
        let our_err: Error = sql_err.into();
        assert!(matches!(our_err, Error::Database(_)));
    }

    #[test]
    fn test_not_found_and_gone() {
        assert!(matches!(Error::NotFound("x".into()), Error::NotFound(_)));
        assert!(matches!(Error::Gone("x".into()), Error::Gone(_)));
    }
}

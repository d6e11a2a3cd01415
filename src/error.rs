// src/error.rs

//! Unified error handling for the catalog synchronizer.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Release archive could not be read
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote service asked us to wait until `reset_at`.
    #[error("Rate limit exceeded, resets at {reset_at}")]
    Throttled { reset_at: DateTime<Utc> },

    /// The requested identity does not exist (anymore).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content of an item could not be fetched or extracted.
    #[error("Transfer failed for {context}: {message}")]
    Transfer { context: String, message: String },

    /// Unexpected response from the remote API.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The new catalog shrank implausibly; nothing is written.
    #[error(
        "Catalog collapsed from {previous_count} to {current_count} entries, refusing to write"
    )]
    Collapse {
        current_count: usize,
        previous_count: usize,
    },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error for an identity or path.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a transfer error with context.
    pub fn transfer(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transfer {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Deadline after which the failed call may be retried, if any.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Throttled { reset_at } => Some(*reset_at),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the local environment rather than the processed item failed.
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_at_only_for_throttled() {
        let reset_at = Utc::now();
        assert_eq!(AppError::Throttled { reset_at }.retry_at(), Some(reset_at));
        assert_eq!(AppError::not_found("a/b").retry_at(), None);
        assert_eq!(AppError::transfer("a/b", "boom").retry_at(), None);
    }

    #[test]
    fn test_environment_errors() {
        assert!(AppError::config("no such tool").is_environment());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(AppError::Io(io).is_environment());
        assert!(!AppError::transfer("a/b", "boom").is_environment());
        assert!(!AppError::validation("bad output").is_environment());
    }

    #[test]
    fn test_collapse_message() {
        let err = AppError::Collapse {
            current_count: 40,
            previous_count: 100,
        };
        assert!(err.to_string().contains("100 to 40"));
    }
}

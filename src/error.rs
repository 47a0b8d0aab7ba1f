//! Error types and handling for PowerMap
//!
//! This module defines the error types used throughout the application.
//! The fetch/parse kinds (`FetchTimeout`, `FetchFailure`, `MalformedResponse`,
//! `NoData`) are absorbed at the per-source cycle boundary and never leave a
//! polling loop.

use thiserror::Error;

/// Result type alias for PowerMap operations
pub type Result<T> = std::result::Result<T, PowerMapError>;

/// Main error type for PowerMap
#[derive(Debug, Error)]
pub enum PowerMapError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Transport-level errors from a single request attempt
    #[error("Network error: {message}")]
    Network { message: String },

    /// Unknown or unsupported character encoding label
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// Overall fetch deadline exceeded; no further attempts were made
    #[error("Fetch timed out: {message}")]
    FetchTimeout { message: String },

    /// Transport or status error on the final fetch attempt
    #[error("Fetch failed: {message}")]
    FetchFailure { message: String },

    /// Header marker rows were not found in an otherwise successful fetch
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// No row qualified as today's reading
    #[error("No data: {message}")]
    NoData { message: String },
}

impl PowerMapError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        PowerMapError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        PowerMapError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        PowerMapError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        PowerMapError::Network {
            message: message.into(),
        }
    }

    /// Create a new encoding error
    pub fn encoding<S: Into<String>>(message: S) -> Self {
        PowerMapError::Encoding {
            message: message.into(),
        }
    }

    /// Create a new fetch timeout error
    pub fn fetch_timeout<S: Into<String>>(message: S) -> Self {
        PowerMapError::FetchTimeout {
            message: message.into(),
        }
    }

    /// Create a new fetch failure error
    pub fn fetch_failure<S: Into<String>>(message: S) -> Self {
        PowerMapError::FetchFailure {
            message: message.into(),
        }
    }

    /// Create a new malformed response error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        PowerMapError::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a new no-data error
    pub fn no_data<S: Into<String>>(message: S) -> Self {
        PowerMapError::NoData {
            message: message.into(),
        }
    }

    /// Whether this error is the overall-deadline kind
    pub fn is_timeout(&self) -> bool {
        matches!(self, PowerMapError::FetchTimeout { .. })
    }
}

impl From<std::io::Error> for PowerMapError {
    fn from(err: std::io::Error) -> Self {
        PowerMapError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for PowerMapError {
    fn from(err: serde_yaml::Error) -> Self {
        PowerMapError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for PowerMapError {
    fn from(err: reqwest::Error) -> Self {
        PowerMapError::network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PowerMapError::config("test config error");
        assert!(matches!(err, PowerMapError::Config { .. }));

        let err = PowerMapError::fetch_timeout("deadline");
        assert!(err.is_timeout());

        let err = PowerMapError::fetch_failure("503");
        assert!(!err.is_timeout());

        let err = PowerMapError::validation("field", "test validation error");
        assert!(matches!(err, PowerMapError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PowerMapError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = PowerMapError::validation("test_field", "invalid value");
        assert_eq!(
            format!("{}", err),
            "Validation error: test_field - invalid value"
        );

        let err = PowerMapError::malformed("peak header not found");
        assert_eq!(
            format!("{}", err),
            "Malformed response: peak header not found"
        );
    }
}

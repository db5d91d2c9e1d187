//! Error types for LECF
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for LECF operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for LECF
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate-authority client errors (subprocess spawn, I/O)
    #[error("CA client error: {0}")]
    CaClient(String),

    /// HTTP client errors (IP probes, provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Filesystem and process I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a CA client error
    pub fn ca_client(msg: impl Into<String>) -> Self {
        Self::CaClient(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = Error::provider("cloudflare", "zone lookup failed");
        assert_eq!(
            err.to_string(),
            "Provider error (cloudflare): zone lookup failed"
        );
    }

    #[test]
    fn test_toml_error_converts() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err: Error = parsed.unwrap_err().into();
        assert!(matches!(err, Error::Toml(_)));
    }
}

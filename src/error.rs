//! Error types for the SASL channel implementation

use std::io;
use thiserror::Error;

/// Result type for SASL channel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SASL channel operations
///
/// None of these are retried internally; re-authentication requires a fresh
/// session object built by the surrounding transport layer.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Underlying cryptographic or mechanism library failed to initialize a
    /// context; fatal to the session
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Advertised authentication method is not one of the supported kinds
    #[error("Unsupported authentication method: {0}")]
    UnsupportedMethod(String),

    /// Mechanism rejected a challenge or reported a non-success,
    /// non-continue status; the connection must be abandoned
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Text transport encode/decode failure on malformed input
    #[error("Transport encoding error: {0}")]
    Encoding(String),

    /// Block-cipher primitive failure; the session's counter state is no
    /// longer trustworthy and the session must not be reused
    #[error("Cipher error: {0}")]
    Cipher(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Authentication("mechanism rejected challenge".to_string());
        assert_eq!(
            err.to_string(),
            "Authentication failed: mechanism rejected challenge"
        );

        let err = Error::UnsupportedMethod("SIMPLE".to_string());
        assert!(err.to_string().contains("SIMPLE"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}

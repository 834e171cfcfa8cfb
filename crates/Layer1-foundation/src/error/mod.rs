//! Error types for Overseer
//!
//! Foundation-level errors: reading and validating configuration.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Overseer foundation error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or invalid configuration file
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::Config("maxDrainBytes must be greater than zero".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: maxDrainBytes must be greater than zero"
        );

        let err: Error = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err, Error::Io(_)));
    }
}

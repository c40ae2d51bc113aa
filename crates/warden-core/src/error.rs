use thiserror::Error;

/// Top-level error type for the Warden system.
///
/// Covers the cross-cutting failures (configuration, ids, file I/O).
/// Subsystem crates define their own error types for domain failures and
/// convert into this one where they cross a crate boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for WardenError {
    fn from(err: toml::de::Error) -> Self {
        WardenError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for WardenError {
    fn from(err: toml::ser::Error) -> Self {
        WardenError::Config(err.to_string())
    }
}

/// A specialized `Result` type for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;

//! Error types for the flat-file stores.

use std::path::PathBuf;

use warden_core::types::UserId;

/// Errors from the flagged-identity roster.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("Failed to load roster from {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("User {0} is already in the roster")]
    DuplicateKey(UserId),
    #[error("User {0} is not in the roster")]
    NotFound(UserId),
    #[error("Failed to write roster file: {0}")]
    Persist(#[source] std::io::Error),
    #[error("Invalid roster record: {0}")]
    InvalidRecord(String),
}

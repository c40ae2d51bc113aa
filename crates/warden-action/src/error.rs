//! Error types for the moderation engine.

use warden_core::types::UserId;
use warden_storage::RosterError;

use crate::command::Permission;

/// Errors raised by the chat platform.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("Member not found: {0}")]
    MemberNotFound(UserId),
    #[error("Missing platform permission: {0}")]
    Forbidden(String),
    #[error("Platform request failed: {0}")]
    Request(String),
}

/// Failure of a single moderation action against one target.
///
/// Inside a batch run these are isolated: counted, logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("Invalid action payload: {0}")]
    InvalidPayload(String),
}

/// Errors from the paginated result-session table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("This pagination session has expired.")]
    Expired(UserId),
    #[error("Cannot open a session over an empty result")]
    Empty,
    #[error("Malformed pagination token: {0:?}")]
    MalformedToken(String),
}

/// Errors returned from a command to the presentation layer.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Please wait {remaining_secs} seconds before using this command again.")]
    RateLimited { remaining_secs: u64 },
    #[error("You need {0} permissions to use this command.")]
    PermissionDenied(Permission),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("That user is not in this server.")]
    MemberNotInServer(UserId),
    #[error("A batch run is already in progress for this user.")]
    BatchInProgress,
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("Action failed: {0}")]
    Action(#[from] ActionError),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Notice shown to the user when a command fails for an internal reason.
pub const GENERIC_FAILURE: &str = "An error occurred while processing this command.";

impl CommandError {
    /// Faults that are logged in detail but never shown verbatim.
    pub fn is_internal(&self) -> bool {
        matches!(self, CommandError::Internal(_))
    }

    /// Text for the end user.
    pub fn user_message(&self) -> String {
        if self.is_internal() {
            GENERIC_FAILURE.to_string()
        } else {
            self.to_string()
        }
    }
}

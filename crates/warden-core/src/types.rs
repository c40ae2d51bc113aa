//! Shared domain types for the Warden system.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WardenError;

// =============================================================================
// Identifiers
// =============================================================================

/// Platform user identifier.
///
/// Invariant: non-empty and made only of ASCII digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Parse a user id, rejecting anything that is not a run of digits.
    pub fn parse(raw: &str) -> Result<Self, WardenError> {
        if is_numeric_id(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(WardenError::InvalidUserId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returns true when `raw` matches `^\d+$`.
pub fn is_numeric_id(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = WardenError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = WardenError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_numeric_id(&value) {
            Ok(Self(value))
        } else {
            Err(WardenError::InvalidUserId(value))
        }
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

// =============================================================================
// Roster and membership records
// =============================================================================

/// An identity recorded in the flagged-user roster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedIdentity {
    pub id: UserId,
    /// Name the identity was flagged under. A single whitespace-free token.
    pub display_name: String,
    /// Server the identity was flagged on. May contain spaces.
    pub origin_server: String,
}

/// A live member of the moderated server, as reported by the platform.
///
/// Lives only for the duration of one scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    pub display_tag: String,
}

impl MembershipRecord {
    /// Mention markup understood by the chat platform.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// The user on whose behalf an operation runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub tag: String,
}

impl Actor {
    pub fn new(id: UserId, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
        }
    }
}

impl From<&MembershipRecord> for Actor {
    fn from(member: &MembershipRecord) -> Self {
        Self {
            id: member.id.clone(),
            tag: member.display_tag.clone(),
        }
    }
}

//! Intersection of a live membership snapshot with the roster.

use serde::Serialize;
use warden_core::types::{FlaggedIdentity, MembershipRecord};
use warden_storage::RosterStore;

/// A live member whose id is on the roster.
///
/// Invariant: `member.id == identity.id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub member: MembershipRecord,
    pub identity: FlaggedIdentity,
}

/// Matches in live-membership order.
///
/// Identities are copied out of the roster, so the result is a frozen
/// snapshot that later reloads do not affect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    matches: Vec<Match>,
}

impl MatchResult {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Match> {
        self.matches.iter()
    }

    pub fn as_slice(&self) -> &[Match] {
        &self.matches
    }

    pub fn into_vec(self) -> Vec<Match> {
        self.matches
    }
}

/// Compute the non-bot members whose id is on the roster.
pub fn match_members(live: &[MembershipRecord], roster: &RosterStore) -> MatchResult {
    let matches = live
        .iter()
        .filter(|member| !member.is_bot)
        .filter_map(|member| {
            roster.get(&member.id).map(|identity| Match {
                member: member.clone(),
                identity: identity.clone(),
            })
        })
        .collect();
    MatchResult { matches }
}

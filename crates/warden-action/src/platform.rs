//! Boundary to the chat platform.
//!
//! The gateway client itself lives outside Warden. The engine only needs the
//! handful of calls in [`GuildPlatform`]; [`InMemoryPlatform`] implements them
//! over a fixed membership snapshot for offline runs and tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use warden_core::types::{MembershipRecord, UserId};

use crate::error::PlatformError;

/// Operations Warden performs against one moderated server.
#[async_trait]
pub trait GuildPlatform: Send + Sync {
    /// Human-readable name of the moderated server.
    fn guild_name(&self) -> &str;

    /// Fetch the full live membership, in the platform's order.
    async fn fetch_members(&self) -> Result<Vec<MembershipRecord>, PlatformError>;

    /// Fetch one member, `None` if the user is not in the server.
    async fn fetch_member(&self, id: &UserId) -> Result<Option<MembershipRecord>, PlatformError>;

    async fn ban(&self, id: &UserId, reason: &str) -> Result<(), PlatformError>;

    async fn send_direct_message(&self, id: &UserId, text: &str) -> Result<(), PlatformError>;
}

/// A delivered direct message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: UserId,
    pub text: String,
}

#[derive(Debug, Default)]
struct PlatformState {
    members: Vec<MembershipRecord>,
    bans: Vec<(UserId, String)>,
    messages: Vec<SentMessage>,
    failing: HashSet<UserId>,
    fetch_error: Option<String>,
}

/// Platform backed by an in-memory membership list.
///
/// Banned members are removed from the membership. Users registered with
/// [`fail_for`](Self::fail_for) reject every ban and message.
#[derive(Debug)]
pub struct InMemoryPlatform {
    guild_name: String,
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new(guild_name: impl Into<String>, members: Vec<MembershipRecord>) -> Self {
        Self {
            guild_name: guild_name.into(),
            state: Mutex::new(PlatformState {
                members,
                ..PlatformState::default()
            }),
        }
    }

    /// Make every action against `id` fail.
    pub fn fail_for(&self, id: UserId) {
        self.lock().failing.insert(id);
    }

    /// Make membership fetches fail with `message`.
    pub fn fail_fetches(&self, message: impl Into<String>) {
        self.lock().fetch_error = Some(message.into());
    }

    /// Bans applied so far, in order, with their reasons.
    pub fn bans(&self) -> Vec<(UserId, String)> {
        self.lock().bans.clone()
    }

    /// Direct messages delivered so far, in order.
    pub fn messages(&self) -> Vec<SentMessage> {
        self.lock().messages.clone()
    }

    pub fn members(&self) -> Vec<MembershipRecord> {
        self.lock().members.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        // The state holds plain data, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_failing(state: &PlatformState, id: &UserId) -> Result<(), PlatformError> {
        if state.failing.contains(id) {
            Err(PlatformError::Forbidden(format!("cannot act on {}", id)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GuildPlatform for InMemoryPlatform {
    fn guild_name(&self) -> &str {
        &self.guild_name
    }

    async fn fetch_members(&self) -> Result<Vec<MembershipRecord>, PlatformError> {
        let state = self.lock();
        if let Some(ref message) = state.fetch_error {
            return Err(PlatformError::Request(message.clone()));
        }
        Ok(state.members.clone())
    }

    async fn fetch_member(&self, id: &UserId) -> Result<Option<MembershipRecord>, PlatformError> {
        let state = self.lock();
        if let Some(ref message) = state.fetch_error {
            return Err(PlatformError::Request(message.clone()));
        }
        Ok(state.members.iter().find(|m| &m.id == id).cloned())
    }

    async fn ban(&self, id: &UserId, reason: &str) -> Result<(), PlatformError> {
        let mut state = self.lock();
        Self::check_failing(&state, id)?;
        let before = state.members.len();
        state.members.retain(|m| &m.id != id);
        if state.members.len() == before {
            return Err(PlatformError::MemberNotFound(id.clone()));
        }
        state.bans.push((id.clone(), reason.to_string()));
        tracing::info!(user_id = %id, reason = %reason, "Member banned");
        Ok(())
    }

    async fn send_direct_message(&self, id: &UserId, text: &str) -> Result<(), PlatformError> {
        let mut state = self.lock();
        Self::check_failing(&state, id)?;
        if !state.members.iter().any(|m| &m.id == id) {
            return Err(PlatformError::MemberNotFound(id.clone()));
        }
        state.messages.push(SentMessage {
            to: id.clone(),
            text: text.to_string(),
        });
        tracing::info!(user_id = %id, "Direct message sent");
        Ok(())
    }
}

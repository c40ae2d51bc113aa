//! Warning direct-message handler.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use warden_core::types::{MembershipRecord, UserId};
use warden_storage::AuditAction;

use crate::error::ActionError;
use crate::handler::ModerationAction;
use crate::platform::GuildPlatform;

pub const DEFAULT_WARNING: &str =
    "Warning: Your account has been detected in our banned users database.";

/// Sends a warning DM stating the target's roster status.
pub struct WarnAction {
    platform: Arc<dyn GuildPlatform>,
    message: String,
    moderator_tag: String,
    flagged: HashSet<UserId>,
}

impl WarnAction {
    /// `flagged` holds the ids the message should report as matched.
    pub fn new(
        platform: Arc<dyn GuildPlatform>,
        message: Option<String>,
        moderator_tag: impl Into<String>,
        flagged: HashSet<UserId>,
    ) -> Self {
        Self {
            platform,
            message: message.unwrap_or_else(|| DEFAULT_WARNING.to_string()),
            moderator_tag: moderator_tag.into(),
            flagged,
        }
    }

    /// Full text delivered to `target`.
    pub fn compose(&self, target: &UserId) -> String {
        let status = if self.flagged.contains(target) {
            "BANNED"
        } else {
            "NOT BANNED"
        };
        format!(
            "{}\n\nMatch Status: {}\nServer: {}\nModerator: {}",
            self.message,
            status,
            self.platform.guild_name(),
            self.moderator_tag
        )
    }
}

#[async_trait]
impl ModerationAction for WarnAction {
    fn kind(&self) -> AuditAction {
        AuditAction::WarningDm
    }

    fn reason(&self) -> &str {
        &self.message
    }

    async fn apply(&self, target: &MembershipRecord) -> Result<(), ActionError> {
        if self.message.trim().is_empty() {
            return Err(ActionError::InvalidPayload(
                "Warning message must not be empty".to_string(),
            ));
        }
        let text = self.compose(&target.id);
        self.platform.send_direct_message(&target.id, &text).await?;
        Ok(())
    }
}

//! Ban action handler.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::types::MembershipRecord;
use warden_storage::AuditAction;

use crate::error::ActionError;
use crate::handler::ModerationAction;
use crate::platform::GuildPlatform;

/// Reason attached to bans issued from a roster match.
pub const ROSTER_MATCH_REASON: &str = "Matched banned users database";

/// Bans the target from the moderated server.
pub struct BanAction {
    platform: Arc<dyn GuildPlatform>,
    reason: String,
}

impl BanAction {
    pub fn new(platform: Arc<dyn GuildPlatform>) -> Self {
        Self::with_reason(platform, ROSTER_MATCH_REASON)
    }

    pub fn with_reason(platform: Arc<dyn GuildPlatform>, reason: impl Into<String>) -> Self {
        Self {
            platform,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ModerationAction for BanAction {
    fn kind(&self) -> AuditAction {
        AuditAction::Ban
    }

    fn reason(&self) -> &str {
        &self.reason
    }

    async fn apply(&self, target: &MembershipRecord) -> Result<(), ActionError> {
        self.platform.ban(&target.id, &self.reason).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::platform::InMemoryPlatform;
    use warden_core::types::UserId;

    fn member(id: &str) -> MembershipRecord {
        MembershipRecord {
            id: UserId::parse(id).unwrap(),
            is_bot: false,
            display_tag: format!("user{}", id),
        }
    }

    #[tokio::test]
    async fn test_ban_uses_default_reason() {
        let platform = Arc::new(InMemoryPlatform::new("g", vec![member("1")]));
        let action = BanAction::new(platform.clone());
        action.apply(&member("1")).await.unwrap();

        let bans = platform.bans();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].1, ROSTER_MATCH_REASON);
        assert_eq!(action.kind(), AuditAction::Ban);
    }

    #[tokio::test]
    async fn test_ban_platform_error_becomes_action_error() {
        let platform = Arc::new(InMemoryPlatform::new("g", vec![]));
        let action = BanAction::with_reason(platform, "manual");
        let err = action.apply(&member("1")).await.unwrap_err();
        assert!(matches!(
            err,
            ActionError::Platform(PlatformError::MemberNotFound(_))
        ));
        assert_eq!(action.reason(), "manual");
    }
}

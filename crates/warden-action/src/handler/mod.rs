//! Moderation action trait and its implementations.
//!
//! A `ModerationAction` is applied to one matched member at a time by the
//! batch executor, or directly for single-target commands.

pub mod ban;
pub mod warn;

use async_trait::async_trait;
use warden_core::types::MembershipRecord;
use warden_storage::AuditAction;

use crate::error::ActionError;

pub use ban::BanAction;
pub use warn::WarnAction;

/// An action Warden can take against one member.
#[async_trait]
pub trait ModerationAction: Send + Sync {
    /// Audit log label for this action.
    fn kind(&self) -> AuditAction;

    /// Reason recorded alongside the action.
    fn reason(&self) -> &str;

    async fn apply(&self, target: &MembershipRecord) -> Result<(), ActionError>;
}

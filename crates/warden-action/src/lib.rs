//! Moderation engine for Warden.
//!
//! Matches the live membership of a server against the flagged-identity
//! roster, pages the results per moderator, and applies throttled batch
//! actions behind per-user cooldowns.

pub mod command;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handler;
pub mod matcher;
pub mod platform;
pub mod session;

pub use command::{
    Command, CommandContext, CommandOutcome, Dispatcher, HelpEntry, PageRequest, Permission,
    Permissions, Reply, HELP,
};
pub use cooldown::{CooldownGate, PrivilegedOverride};
pub use engine::{BatchSummary, FlaggedReport, ModerationEngine, RosterStatus, UserCheck};
pub use error::{ActionError, CommandError, PlatformError, SessionError, GENERIC_FAILURE};
pub use executor::{BatchExecutor, BatchRun};
pub use handler::{BanAction, ModerationAction, WarnAction};
pub use matcher::{match_members, Match, MatchResult};
pub use platform::{GuildPlatform, InMemoryPlatform, SentMessage};
pub use session::{Direction, Page, PageControls, PageToken, SessionId, SessionManager};

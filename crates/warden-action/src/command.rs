//! Command surface.
//!
//! [`Dispatcher`] turns a parsed [`Command`] into engine calls. It applies the
//! cooldown gate, then the permission check, then runs the command.
//! [`Dispatcher::handle`] is the outermost boundary: it always produces a
//! [`Reply`] and never lets a failure escape.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use warden_core::config::WardenConfig;
use warden_core::types::{is_numeric_id, Actor, FlaggedIdentity, MembershipRecord, UserId};

use crate::cooldown::{CooldownGate, PrivilegedOverride};
use crate::engine::{BatchSummary, FlaggedReport, ModerationEngine, RosterStatus, UserCheck};
use crate::error::CommandError;
use crate::matcher::Match;
use crate::session::{Direction, Page, PageToken};

/// Platform permission a command requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Permission {
    BanMembers,
    Administrator,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::BanMembers => write!(f, "ban"),
            Permission::Administrator => write!(f, "administrator"),
        }
    }
}

/// Permissions the caller holds in the moderated server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub ban_members: bool,
    pub administrator: bool,
}

impl Permissions {
    pub fn admin() -> Self {
        Self {
            ban_members: true,
            administrator: true,
        }
    }

    pub fn moderator() -> Self {
        Self {
            ban_members: true,
            administrator: false,
        }
    }

    /// Administrators hold every permission.
    pub fn allows(&self, required: Permission) -> bool {
        match required {
            Permission::BanMembers => self.ban_members || self.administrator,
            Permission::Administrator => self.administrator,
        }
    }
}

/// Who issued a command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub caller: Actor,
    pub permissions: Permissions,
}

/// How a `page` command moves through the caller's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// A control token issued with a previously served page.
    Token(PageToken),
    /// One step from the last page served.
    Step(Direction),
}

/// A parsed moderation command. Raw id arguments are validated on dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan,
    Page(PageRequest),
    BanAll,
    WarnAll {
        message: Option<String>,
    },
    Check {
        user_id: String,
    },
    Warn {
        user_id: String,
        message: Option<String>,
    },
    Report,
    Reload,
    Add {
        user_id: String,
        display_name: String,
        origin_server: String,
    },
    Remove {
        user_id: String,
    },
    Status,
    Override {
        enabled: bool,
    },
    Cancel,
    Help,
}

impl Command {
    /// Name used for cooldown keys and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Scan => "scan",
            Command::Page(_) => "page",
            Command::BanAll => "ban-all",
            Command::WarnAll { .. } => "warn-all",
            Command::Check { .. } => "check",
            Command::Warn { .. } => "warn",
            Command::Report => "report",
            Command::Reload => "reload",
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
            Command::Status => "status",
            Command::Override { .. } => "override",
            Command::Cancel => "cancel",
            Command::Help => "help",
        }
    }

    pub fn required_permission(&self) -> Option<Permission> {
        match self {
            Command::Scan
            | Command::BanAll
            | Command::WarnAll { .. }
            | Command::Check { .. }
            | Command::Warn { .. }
            | Command::Report
            | Command::Status
            | Command::Cancel => Some(Permission::BanMembers),
            Command::Reload
            | Command::Add { .. }
            | Command::Remove { .. }
            | Command::Override { .. } => Some(Permission::Administrator),
            Command::Page(_) | Command::Help => None,
        }
    }

    /// Page controls are not rate limited.
    pub fn is_rate_limited(&self) -> bool {
        !matches!(self, Command::Page(_))
    }
}

/// One line of the command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HelpEntry {
    pub usage: &'static str,
    pub description: &'static str,
}

pub const HELP: &[HelpEntry] = &[
    HelpEntry { usage: "scan", description: "Scan the server for users in the roster" },
    HelpEntry { usage: "page <prev|next|token>", description: "Move through the last scan result" },
    HelpEntry { usage: "ban-all", description: "Ban every roster match in the server" },
    HelpEntry { usage: "warn-all [message]", description: "Send the warning DM to every roster match" },
    HelpEntry { usage: "check <user-id>", description: "Check one user against the roster" },
    HelpEntry { usage: "warn <user-id> [message]", description: "Send the warning DM to one member" },
    HelpEntry { usage: "report", description: "Mention every flagged member in the server" },
    HelpEntry { usage: "reload", description: "Reload the roster file" },
    HelpEntry { usage: "add <user-id> <name> <server>", description: "Add a user to the roster" },
    HelpEntry { usage: "remove <user-id>", description: "Remove a user from the roster" },
    HelpEntry { usage: "status", description: "Show roster statistics" },
    HelpEntry { usage: "override <on|off>", description: "Toggle the privileged override" },
    HelpEntry { usage: "cancel", description: "Stop your running batch action" },
    HelpEntry { usage: "help", description: "Show this list" },
];

/// Successful result of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum CommandOutcome {
    ScanPage(Page<Match>),
    NoMatches,
    Page(Page<Match>),
    Batch(BatchSummary),
    Check(UserCheck),
    Warned(MembershipRecord),
    Report(FlaggedReport),
    Reloaded { total: usize },
    Added(FlaggedIdentity),
    Removed(FlaggedIdentity),
    Status(RosterStatus),
    Override { enabled: bool },
    Cancel { stopped: bool },
    Help(Vec<HelpEntry>),
}

/// What the presentation layer shows for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Outcome(CommandOutcome),
    /// User-facing failure text.
    Notice(String),
}

/// Routes commands to the engine behind the cooldown and permission checks.
pub struct Dispatcher {
    engine: Arc<ModerationEngine>,
    cooldowns: CooldownGate,
    privileged: PrivilegedOverride,
}

impl Dispatcher {
    pub fn new(engine: Arc<ModerationEngine>, cooldowns: CooldownGate, privileged: PrivilegedOverride) -> Self {
        Self {
            engine,
            cooldowns,
            privileged,
        }
    }

    pub fn from_config(engine: Arc<ModerationEngine>, config: &WardenConfig) -> Self {
        Self::new(
            engine,
            CooldownGate::from_config(&config.cooldown),
            PrivilegedOverride::from_config(&config.privileged),
        )
    }

    pub fn engine(&self) -> &Arc<ModerationEngine> {
        &self.engine
    }

    pub fn privileged(&self) -> &PrivilegedOverride {
        &self.privileged
    }

    /// Run `command` for `ctx.caller`.
    ///
    /// `on_progress(completed, total)` receives batch progress for
    /// `ban-all` and `warn-all`; other commands never call it.
    pub async fn dispatch<P>(
        &self,
        ctx: &CommandContext,
        command: Command,
        on_progress: P,
    ) -> Result<CommandOutcome, CommandError>
    where
        P: FnMut(usize, usize) + Send,
    {
        let caller = &ctx.caller;
        let privileged = self.privileged.is_active_for(&caller.id);

        if command.is_rate_limited() && !privileged {
            self.cooldowns.enforce(&caller.id, command.name())?;
        }
        if let Some(required) = command.required_permission() {
            if !privileged && !ctx.permissions.allows(required) {
                return Err(CommandError::PermissionDenied(required));
            }
        }

        tracing::info!(command = command.name(), caller = %caller.id, privileged, "Dispatching command");

        let outcome = match command {
            Command::Scan => match self.engine.scan(&caller.id).await? {
                Some(page) => CommandOutcome::ScanPage(page),
                None => CommandOutcome::NoMatches,
            },
            Command::Page(PageRequest::Token(token)) => {
                CommandOutcome::Page(self.engine.navigate(&caller.id, &token)?)
            }
            Command::Page(PageRequest::Step(direction)) => {
                CommandOutcome::Page(self.engine.advance(&caller.id, direction)?)
            }
            Command::BanAll => CommandOutcome::Batch(self.engine.ban_all(caller, on_progress).await?),
            Command::WarnAll { message } => {
                CommandOutcome::Batch(self.engine.warn_all(caller, message, on_progress).await?)
            }
            Command::Check { user_id } => {
                let id = parse_user_id(&user_id)?;
                CommandOutcome::Check(self.engine.check(&id).await)
            }
            Command::Warn { user_id, message } => {
                let id = parse_user_id(&user_id)?;
                CommandOutcome::Warned(self.engine.warn_member(caller, &id, message).await?)
            }
            Command::Report => CommandOutcome::Report(self.engine.report().await?),
            Command::Reload => CommandOutcome::Reloaded {
                total: self.engine.reload()?,
            },
            Command::Add {
                user_id,
                display_name,
                origin_server,
            } => {
                let id = parse_user_id(&user_id)?;
                CommandOutcome::Added(self.engine.add_identity(id, &display_name, &origin_server)?)
            }
            Command::Remove { user_id } => {
                let id = parse_user_id(&user_id)?;
                CommandOutcome::Removed(self.engine.remove_identity(&id)?)
            }
            Command::Status => CommandOutcome::Status(self.engine.status()),
            Command::Override { enabled } => {
                if self.privileged.identity().is_none() {
                    return Err(CommandError::InvalidArgument(
                        "No privileged identity is configured.".to_string(),
                    ));
                }
                self.privileged.set_enabled(enabled);
                CommandOutcome::Override { enabled }
            }
            Command::Cancel => CommandOutcome::Cancel {
                stopped: self.engine.cancel_batch(&caller.id),
            },
            Command::Help => CommandOutcome::Help(HELP.to_vec()),
        };
        Ok(outcome)
    }

    /// Run `command` on its own task and turn any failure into a notice.
    ///
    /// A panic inside the command surfaces as the generic failure text; the
    /// detail only goes to the log.
    pub async fn handle<P>(self: &Arc<Self>, ctx: CommandContext, command: Command, on_progress: P) -> Reply
    where
        P: FnMut(usize, usize) + Send + 'static,
    {
        let name = command.name();
        let caller = ctx.caller.id.clone();
        let dispatcher = Arc::clone(self);
        let task = tokio::spawn(async move { dispatcher.dispatch(&ctx, command, on_progress).await });

        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(CommandError::Internal(e.to_string())),
        };

        match result {
            Ok(outcome) => Reply::Outcome(outcome),
            Err(e) => {
                if e.is_internal() {
                    tracing::error!(command = name, caller = %caller, error = %e, "Command failed");
                } else {
                    tracing::debug!(command = name, caller = %caller, error = %e, "Command rejected");
                }
                Reply::Notice(e.user_message())
            }
        }
    }
}

fn parse_user_id(raw: &str) -> Result<UserId, CommandError> {
    let raw = raw.trim();
    if !is_numeric_id(raw) {
        return Err(CommandError::InvalidArgument("Invalid user ID format.".to_string()));
    }
    UserId::parse(raw).map_err(|e| CommandError::InvalidArgument(e.to_string()))
}

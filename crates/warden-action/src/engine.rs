//! Moderation engine.
//!
//! Owns the shared state (roster, sessions, in-flight batch runs) and
//! coordinates scan, reconcile and act against the platform. State is held
//! in this explicit context object; nothing is process-global.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use warden_core::config::WardenConfig;
use warden_core::types::{Actor, FlaggedIdentity, MembershipRecord, UserId};
use warden_storage::{AuditEntry, AuditLog, RosterError, RosterStore};

use crate::error::CommandError;
use crate::executor::{BatchExecutor, BatchRun};
use crate::handler::{BanAction, ModerationAction, WarnAction};
use crate::matcher::{match_members, Match, MatchResult};
use crate::platform::GuildPlatform;
use crate::session::{Direction, Page, PageToken, SessionManager};

/// Members listed per section of a flagged-member report.
pub const REPORT_SECTION_SIZE: usize = 25;

/// Result of a batch command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Audit label of the action applied.
    pub action: String,
    pub run: BatchRun,
}

/// Roster and membership status of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCheck {
    pub user_id: UserId,
    pub in_server: bool,
    pub identity: Option<FlaggedIdentity>,
}

/// Flagged members currently in the server, for a mention-everyone report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedReport {
    pub mentions: String,
    pub sections: Vec<Vec<Match>>,
    pub total: usize,
}

/// Roster size and file age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterStatus {
    pub total: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Shared moderation state and the operations over it.
pub struct ModerationEngine {
    platform: Arc<dyn GuildPlatform>,
    roster: RwLock<RosterStore>,
    audit: AuditLog,
    sessions: Arc<SessionManager<Match>>,
    executor: BatchExecutor,
    active_runs: Mutex<HashMap<UserId, CancellationToken>>,
}

/// Unregisters an in-flight batch run when dropped.
struct RunGuard<'a> {
    engine: &'a ModerationEngine,
    owner: UserId,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.engine.runs().remove(&self.owner);
    }
}

impl ModerationEngine {
    pub fn new(
        platform: Arc<dyn GuildPlatform>,
        roster: RosterStore,
        audit: AuditLog,
        config: &WardenConfig,
    ) -> Self {
        Self {
            platform,
            roster: RwLock::new(roster),
            audit,
            sessions: Arc::new(SessionManager::from_config(&config.session)),
            executor: BatchExecutor::from_config(&config.batch),
            active_runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn platform(&self) -> &Arc<dyn GuildPlatform> {
        &self.platform
    }

    pub fn sessions(&self) -> &Arc<SessionManager<Match>> {
        &self.sessions
    }

    fn read_roster(&self) -> RwLockReadGuard<'_, RosterStore> {
        self.roster.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_roster(&self) -> RwLockWriteGuard<'_, RosterStore> {
        self.roster.write().unwrap_or_else(|e| e.into_inner())
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<UserId, CancellationToken>> {
        self.active_runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Roster
    // =========================================================================

    /// Re-read the roster file.
    pub fn reload(&self) -> Result<usize, RosterError> {
        self.write_roster().load()
    }

    pub fn add_identity(
        &self,
        id: UserId,
        display_name: &str,
        origin_server: &str,
    ) -> Result<FlaggedIdentity, RosterError> {
        let mut roster = self.write_roster();
        let added = roster.add(id, display_name, origin_server)?.clone();
        Ok(added)
    }

    pub fn remove_identity(&self, id: &UserId) -> Result<FlaggedIdentity, RosterError> {
        self.write_roster().remove(id)
    }

    pub fn status(&self) -> RosterStatus {
        let roster = self.read_roster();
        RosterStatus {
            total: roster.len(),
            last_modified: roster.last_modified(),
        }
    }

    // =========================================================================
    // Scan
    // =========================================================================

    /// Reload the roster and match it against the live membership.
    pub async fn find_matches(&self) -> Result<MatchResult, CommandError> {
        self.reload()?;
        let members = self.platform.fetch_members().await?;
        let roster = self.read_roster();
        let matches = match_members(&members, &roster);
        tracing::info!(
            members = members.len(),
            roster = roster.len(),
            matched = matches.len(),
            "Membership scanned"
        );
        Ok(matches)
    }

    /// Scan and open a result session for `owner`.
    ///
    /// Returns `None` when nothing matched; no session is created then.
    pub async fn scan(&self, owner: &UserId) -> Result<Option<Page<Match>>, CommandError> {
        let matches = self.find_matches().await?;
        if matches.is_empty() {
            return Ok(None);
        }
        let page = self.sessions.create(owner.clone(), matches.into_vec())?;
        self.sessions.schedule_expiry(owner.clone(), page.session_id);
        Ok(Some(page))
    }

    pub fn advance(&self, owner: &UserId, direction: Direction) -> Result<Page<Match>, CommandError> {
        Ok(self.sessions.advance(owner, direction)?)
    }

    /// Follow a pagination token. Tokens only work for the session they were issued to.
    pub fn navigate(&self, caller: &UserId, token: &PageToken) -> Result<Page<Match>, CommandError> {
        if &token.owner != caller {
            return Err(CommandError::InvalidArgument(
                "These controls belong to another user.".to_string(),
            ));
        }
        Ok(self.sessions.navigate(token)?)
    }

    /// Flagged members in the server, with mentions, in sections of 25.
    pub async fn report(&self) -> Result<FlaggedReport, CommandError> {
        let matches = self.find_matches().await?;
        let mentions = matches
            .iter()
            .map(|m| m.member.mention())
            .collect::<Vec<_>>()
            .join(" ");
        let sections = matches
            .as_slice()
            .chunks(REPORT_SECTION_SIZE)
            .map(<[Match]>::to_vec)
            .collect();
        Ok(FlaggedReport {
            mentions,
            sections,
            total: matches.len(),
        })
    }

    /// Roster and membership status of `id`.
    pub async fn check(&self, id: &UserId) -> UserCheck {
        let in_server = self.lookup_member(id).await.is_some();
        let identity = self.read_roster().get(id).cloned();
        UserCheck {
            user_id: id.clone(),
            in_server,
            identity,
        }
    }

    async fn lookup_member(&self, id: &UserId) -> Option<MembershipRecord> {
        match self.platform.fetch_member(id).await {
            Ok(member) => member,
            Err(e) => {
                tracing::debug!(user_id = %id, error = %e, "Member lookup failed");
                None
            }
        }
    }

    // =========================================================================
    // Act
    // =========================================================================

    fn begin_run(&self, owner: &UserId) -> Result<(RunGuard<'_>, CancellationToken), CommandError> {
        let mut runs = self.runs();
        if runs.contains_key(owner) {
            return Err(CommandError::BatchInProgress);
        }
        let token = CancellationToken::new();
        runs.insert(owner.clone(), token.clone());
        Ok((
            RunGuard {
                engine: self,
                owner: owner.clone(),
            },
            token,
        ))
    }

    /// Cancel `owner`'s in-flight batch run. Returns false if none is running.
    pub fn cancel_batch(&self, owner: &UserId) -> bool {
        match self.runs().get(owner) {
            Some(token) => {
                token.cancel();
                tracing::info!(owner = %owner, "Batch run cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn has_active_run(&self, owner: &UserId) -> bool {
        self.runs().contains_key(owner)
    }

    /// Apply `action` to every match in order, auditing each success.
    ///
    /// Runs against the given snapshot; roster reloads during the run do not
    /// change its targets.
    pub async fn run_batch<P>(
        &self,
        executor: &Actor,
        action: &dyn ModerationAction,
        matches: &MatchResult,
        on_progress: P,
    ) -> Result<BatchRun, CommandError>
    where
        P: FnMut(usize, usize) + Send,
    {
        let (_guard, cancel) = self.begin_run(&executor.id)?;
        let audit = &self.audit;

        let run = self
            .executor
            .run(
                matches.as_slice(),
                |m| async move {
                    action.apply(&m.member).await?;
                    let target = Actor::from(&m.member);
                    let entry = AuditEntry {
                        action: action.kind(),
                        executor,
                        target: &target,
                        reason: action.reason(),
                    };
                    if let Err(e) = audit.record(&entry) {
                        tracing::error!(target = %target.id, error = %e, "Failed to write audit entry");
                    }
                    Ok(())
                },
                on_progress,
                &cancel,
            )
            .await;
        Ok(run)
    }

    /// Ban every flagged member in the server.
    pub async fn ban_all<P>(&self, executor: &Actor, on_progress: P) -> Result<BatchSummary, CommandError>
    where
        P: FnMut(usize, usize) + Send,
    {
        let matches = self.find_matches().await?;
        let action = BanAction::new(Arc::clone(&self.platform));
        let run = self.run_batch(executor, &action, &matches, on_progress).await?;
        Ok(BatchSummary {
            action: action.kind().to_string(),
            run,
        })
    }

    /// Send the warning DM to every flagged member in the server.
    pub async fn warn_all<P>(
        &self,
        executor: &Actor,
        message: Option<String>,
        on_progress: P,
    ) -> Result<BatchSummary, CommandError>
    where
        P: FnMut(usize, usize) + Send,
    {
        let matches = self.find_matches().await?;
        let flagged: HashSet<UserId> = matches.iter().map(|m| m.member.id.clone()).collect();
        let action = WarnAction::new(Arc::clone(&self.platform), message, executor.tag.clone(), flagged);
        let run = self.run_batch(executor, &action, &matches, on_progress).await?;
        Ok(BatchSummary {
            action: action.kind().to_string(),
            run,
        })
    }

    /// Send the warning DM to one member.
    pub async fn warn_member(
        &self,
        executor: &Actor,
        target_id: &UserId,
        message: Option<String>,
    ) -> Result<MembershipRecord, CommandError> {
        let member = self
            .lookup_member(target_id)
            .await
            .ok_or_else(|| CommandError::MemberNotInServer(target_id.clone()))?;

        let flagged: HashSet<UserId> = if self.read_roster().has(target_id) {
            HashSet::from([target_id.clone()])
        } else {
            HashSet::new()
        };
        let action = WarnAction::new(Arc::clone(&self.platform), message, executor.tag.clone(), flagged);
        action.apply(&member).await?;

        let target = Actor::from(&member);
        let entry = AuditEntry {
            action: action.kind(),
            executor,
            target: &target,
            reason: action.reason(),
        };
        if let Err(e) = self.audit.record(&entry) {
            tracing::error!(target = %target.id, error = %e, "Failed to write audit entry");
        }
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InMemoryPlatform;
    use std::time::Duration;

    fn id(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn member(raw: &str, is_bot: bool) -> MembershipRecord {
        MembershipRecord {
            id: id(raw),
            is_bot,
            display_tag: format!("user{}", raw),
        }
    }

    fn moderator() -> Actor {
        Actor::new(id("900"), "mod#0001")
    }

    struct Fixture {
        dir: tempfile::TempDir,
        platform: Arc<InMemoryPlatform>,
        engine: ModerationEngine,
    }

    fn fixture(roster: &str, members: Vec<MembershipRecord>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let roster_path = dir.path().join("roster.txt");
        std::fs::write(&roster_path, roster).unwrap();
        let platform = Arc::new(InMemoryPlatform::new("Guild", members));
        let mut config = WardenConfig::default();
        config.batch.delay_ms = 0;
        let engine = ModerationEngine::new(
            platform.clone(),
            RosterStore::new(&roster_path),
            AuditLog::new(dir.path().join("audit.txt")),
            &config,
        );
        Fixture {
            dir,
            platform,
            engine,
        }
    }

    fn audit_lines(f: &Fixture) -> Vec<String> {
        std::fs::read_to_string(f.dir.path().join("audit.txt"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_scan_reloads_roster_and_opens_session() {
        let f = fixture(
            "111 x s\n222 y s",
            vec![member("111", false), member("222", true), member("333", false)],
        );
        let page = f.engine.scan(&id("900")).await.unwrap().unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].member.id, id("111"));
        assert_eq!(f.engine.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_without_matches_opens_no_session() {
        let f = fixture("111 x s", vec![member("333", false)]);
        assert!(f.engine.scan(&id("900")).await.unwrap().is_none());
        assert!(f.engine.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_scan_surfaces_platform_errors() {
        let f = fixture("111 x s", vec![]);
        f.platform.fail_fetches("gateway down");
        let err = f.engine.scan(&id("900")).await.unwrap_err();
        assert!(matches!(err, CommandError::Platform(_)));
    }

    #[tokio::test]
    async fn test_navigate_rejects_foreign_token() {
        let f = fixture("111 x s", vec![member("111", false)]);
        f.engine.scan(&id("900")).await.unwrap();
        let token: PageToken = "next|900|0".parse().unwrap();
        assert!(f.engine.navigate(&id("900"), &token).is_ok());
        assert!(matches!(
            f.engine.navigate(&id("901"), &token),
            Err(CommandError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_ban_all_bans_and_audits_matches() {
        let f = fixture(
            "1 a s\n2 b s\n3 c s",
            vec![member("1", false), member("2", false), member("3", false), member("4", false)],
        );
        f.platform.fail_for(id("2"));
        let mut progress = Vec::new();

        let summary = f
            .engine
            .ban_all(&moderator(), |d, t| progress.push((d, t)))
            .await
            .unwrap();

        assert_eq!(summary.action, "BAN");
        assert_eq!(summary.run.succeeded, 2);
        assert_eq!(summary.run.failed, 1);
        assert_eq!(progress, vec![(0, 3), (3, 3)]);

        let banned: Vec<UserId> = f.platform.bans().into_iter().map(|(id, _)| id).collect();
        assert_eq!(banned, vec![id("1"), id("3")]);

        let lines = audit_lines(&f);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("BAN | Executor: mod#0001 (900) | Target: user1 (1)"));
        assert!(lines[1].contains("Target: user3 (3) | Reason: Matched banned users database"));
        assert!(!f.engine.has_active_run(&id("900")));
    }

    #[tokio::test]
    async fn test_warn_all_messages_matches() {
        let f = fixture("1 a s", vec![member("1", false), member("2", false)]);
        let summary = f
            .engine
            .warn_all(&moderator(), Some("Leave now".to_string()), |_, _| {})
            .await
            .unwrap();
        assert_eq!(summary.action, "WARNING_DM");
        assert_eq!(summary.run.succeeded, 1);
        let messages = f.platform.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.contains("Match Status: BANNED"));
        assert!(audit_lines(&f)[0].contains("WARNING_DM"));
    }

    #[tokio::test]
    async fn test_batch_runs_on_snapshot_despite_reload() {
        let f = fixture("1 a s\n2 b s", vec![member("1", false), member("2", false)]);
        let matches = f.engine.find_matches().await.unwrap();

        f.engine.remove_identity(&id("2")).unwrap();
        f.engine.reload().unwrap();

        let action = BanAction::new(f.platform.clone());
        let run = f
            .engine
            .run_batch(&moderator(), &action, &matches, |_, _| {})
            .await
            .unwrap();
        assert_eq!(run.succeeded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_batch_for_same_owner_rejected_and_cancel_stops_first() {
        let dir = tempfile::tempdir().unwrap();
        let roster_path = dir.path().join("roster.txt");
        std::fs::write(&roster_path, "1 a s\n2 b s\n3 c s").unwrap();
        let platform = Arc::new(InMemoryPlatform::new(
            "Guild",
            vec![member("1", false), member("2", false), member("3", false)],
        ));
        let engine = Arc::new(ModerationEngine::new(
            platform.clone(),
            RosterStore::new(&roster_path),
            AuditLog::new(dir.path().join("audit.txt")),
            &WardenConfig::default(),
        ));

        let running = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.ban_all(&moderator(), |_, _| {}).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(engine.has_active_run(&id("900")));
        assert!(matches!(
            engine.ban_all(&moderator(), |_, _| {}).await,
            Err(CommandError::BatchInProgress)
        ));

        assert!(engine.cancel_batch(&id("900")));
        let summary = running.await.unwrap().unwrap();
        assert!(summary.run.cancelled);
        assert_eq!(summary.run.succeeded, 1);
        assert_eq!(platform.bans().len(), 1);
        assert!(!engine.cancel_batch(&id("900")));
    }

    #[tokio::test]
    async fn test_check_reports_membership_and_roster() {
        let f = fixture("1 a home", vec![member("1", false)]);
        f.engine.reload().unwrap();

        let check = f.engine.check(&id("1")).await;
        assert!(check.in_server);
        assert_eq!(check.identity.unwrap().origin_server, "home");

        let check = f.engine.check(&id("2")).await;
        assert!(!check.in_server);
        assert!(check.identity.is_none());
    }

    #[tokio::test]
    async fn test_warn_member_requires_membership() {
        let f = fixture("1 a s", vec![member("1", false)]);
        f.engine.reload().unwrap();

        let warned = f.engine.warn_member(&moderator(), &id("1"), None).await.unwrap();
        assert_eq!(warned.id, id("1"));
        assert!(f.platform.messages()[0].text.contains("BANNED"));
        assert_eq!(audit_lines(&f).len(), 1);

        let err = f
            .engine
            .warn_member(&moderator(), &id("2"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::MemberNotInServer(_)));
    }

    #[tokio::test]
    async fn test_report_sections_of_25() {
        let roster: String = (1..=30).map(|i| format!("{} n{} s\n", i, i)).collect();
        let members = (1..=30).map(|i| member(&i.to_string(), false)).collect();
        let f = fixture(&roster, members);

        let report = f.engine.report().await.unwrap();
        assert_eq!(report.total, 30);
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[0].len(), 25);
        assert_eq!(report.sections[1].len(), 5);
        assert!(report.mentions.starts_with("<@1> <@2>"));
    }

    #[tokio::test]
    async fn test_roster_mutations_and_status() {
        let f = fixture("1 a s", vec![]);
        f.engine.reload().unwrap();

        f.engine.add_identity(id("2"), "b", "other server").unwrap();
        assert!(matches!(
            f.engine.add_identity(id("2"), "b", "x"),
            Err(RosterError::DuplicateKey(_))
        ));
        assert_eq!(f.engine.status().total, 2);

        let removed = f.engine.remove_identity(&id("1")).unwrap();
        assert_eq!(removed.display_name, "a");
        assert!(matches!(
            f.engine.remove_identity(&id("1")),
            Err(RosterError::NotFound(_))
        ));

        let status = f.engine.status();
        assert_eq!(status.total, 1);
        assert!(status.last_modified.is_some());
    }
}

//! Paginated result sessions.
//!
//! Each owner has at most one live session holding the result of their last
//! scan. Sessions live for a fixed TTL counted from creation; reading a page
//! does not extend it. Deferred deletion is keyed to the session instance so a
//! timer left over from a replaced session never removes its successor.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use warden_core::config::SessionConfig;
use warden_core::types::UserId;

use crate::error::SessionError;

/// Identity of one session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pagination direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Prev,
    Next,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Prev => write!(f, "prev"),
            Direction::Next => write!(f, "next"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prev" => Ok(Direction::Prev),
            "next" => Ok(Direction::Next),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// Opaque pagination control token: `<prev|next>|<owner>|<current page>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageToken {
    pub direction: Direction,
    pub owner: UserId,
    pub page: usize,
}

impl PageToken {
    /// Index the token asks for, before clamping.
    fn target(&self) -> i64 {
        let page = i64::try_from(self.page).unwrap_or(i64::MAX);
        match self.direction {
            Direction::Prev => page.saturating_sub(1),
            Direction::Next => page.saturating_add(1),
        }
    }
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.direction, self.owner, self.page)
    }
}

impl FromStr for PageToken {
    type Err = SessionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SessionError::MalformedToken(s.to_string());
        let mut parts = s.split('|');
        let (Some(direction), Some(owner), Some(page), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        Ok(PageToken {
            direction: direction.parse().map_err(|_| malformed())?,
            owner: UserId::parse(owner).map_err(|_| malformed())?,
            page: page.parse().map_err(|_| malformed())?,
        })
    }
}

/// Prev/next controls for a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageControls {
    pub prev: PageToken,
    pub next: PageToken,
    pub prev_disabled: bool,
    pub next_disabled: bool,
}

/// One page served from a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub owner: UserId,
    pub session_id: SessionId,
    pub items: Vec<T>,
    /// Zero-based page index.
    pub index: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl<T> Page<T> {
    pub fn controls(&self) -> PageControls {
        let token = |direction| PageToken {
            direction,
            owner: self.owner.clone(),
            page: self.index,
        };
        PageControls {
            prev: token(Direction::Prev),
            next: token(Direction::Next),
            prev_disabled: self.index == 0,
            next_disabled: self.index + 1 >= self.total_pages,
        }
    }
}

struct ResultSession<T> {
    id: SessionId,
    items: Vec<T>,
    created_at: Instant,
    last_page: usize,
}

/// Table of per-owner result sessions.
pub struct SessionManager<T> {
    page_size: usize,
    ttl: Duration,
    sessions: Mutex<HashMap<UserId, ResultSession<T>>>,
}

impl<T: Clone> SessionManager<T> {
    pub fn new(page_size: usize, ttl: Duration) -> Self {
        Self {
            page_size: page_size.max(1),
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.page_size, Duration::from_secs(config.ttl_secs))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, ResultSession<T>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn total_pages(&self, len: usize) -> usize {
        len.div_ceil(self.page_size)
    }

    /// Open a session for `owner`, replacing any existing one, and serve page 0.
    pub fn create(&self, owner: UserId, items: Vec<T>) -> Result<Page<T>, SessionError> {
        if items.is_empty() {
            return Err(SessionError::Empty);
        }
        let session = ResultSession {
            id: SessionId::new(),
            items,
            created_at: Instant::now(),
            last_page: 0,
        };
        let page = self.render(&owner, &session, 0);
        let replaced = self.lock().insert(owner.clone(), session).is_some();
        tracing::debug!(
            owner = %owner,
            session_id = %page.session_id,
            total_items = page.total_items,
            replaced,
            "Result session created"
        );
        Ok(page)
    }

    /// Serve page `index` of `owner`'s session, clamped into range.
    pub fn page(&self, owner: &UserId, index: i64) -> Result<Page<T>, SessionError> {
        let mut sessions = self.lock();
        let session = Self::live_session(&mut sessions, owner, self.ttl)?;
        let last = self.total_pages(session.items.len()).saturating_sub(1);
        let clamped = usize::try_from(index.max(0)).unwrap_or(usize::MAX).min(last);
        session.last_page = clamped;
        Ok(self.render(owner, session, clamped))
    }

    /// Move one page from the last page served to `owner`, saturating at both ends.
    pub fn advance(&self, owner: &UserId, direction: Direction) -> Result<Page<T>, SessionError> {
        let current = {
            let mut sessions = self.lock();
            Self::live_session(&mut sessions, owner, self.ttl)?.last_page
        };
        let token = PageToken {
            direction,
            owner: owner.clone(),
            page: current,
        };
        self.page(owner, token.target())
    }

    /// Apply a pagination control token.
    pub fn navigate(&self, token: &PageToken) -> Result<Page<T>, SessionError> {
        self.page(&token.owner, token.target())
    }

    /// Remove `owner`'s session only if it is still the instance `id`.
    pub fn expire_instance(&self, owner: &UserId, id: SessionId) -> bool {
        let mut sessions = self.lock();
        match sessions.get(owner) {
            Some(session) if session.id == id => {
                sessions.remove(owner);
                tracing::debug!(owner = %owner, session_id = %id, "Result session expired");
                true
            }
            _ => false,
        }
    }

    /// Drop every session past its TTL. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.created_at) < self.ttl);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn live_session<'a>(
        sessions: &'a mut HashMap<UserId, ResultSession<T>>,
        owner: &UserId,
        ttl: Duration,
    ) -> Result<&'a mut ResultSession<T>, SessionError> {
        let expired = match sessions.get(owner) {
            None => return Err(SessionError::Expired(owner.clone())),
            Some(session) => session.created_at.elapsed() >= ttl,
        };
        if expired {
            sessions.remove(owner);
            return Err(SessionError::Expired(owner.clone()));
        }
        sessions
            .get_mut(owner)
            .ok_or_else(|| SessionError::Expired(owner.clone()))
    }

    fn render(&self, owner: &UserId, session: &ResultSession<T>, index: usize) -> Page<T> {
        let start = index * self.page_size;
        let end = (start + self.page_size).min(session.items.len());
        Page {
            owner: owner.clone(),
            session_id: session.id,
            items: session.items[start..end].to_vec(),
            index,
            total_pages: self.total_pages(session.items.len()),
            total_items: session.items.len(),
        }
    }
}

impl<T: Clone + Send + 'static> SessionManager<T> {
    /// Spawn a one-shot timer that expires this exact session instance after the TTL.
    ///
    /// The deadline is fixed when the timer is scheduled, not when the task is
    /// first polled.
    pub fn schedule_expiry(self: &Arc<Self>, owner: UserId, id: SessionId) -> JoinHandle<()> {
        let deadline = Instant::now() + self.ttl;
        let sessions = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            sessions.expire_instance(&owner, id);
        })
    }

    /// Spawn a loop that calls [`sweep_expired`](Self::sweep_expired) every
    /// `interval` until `shutdown` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let sessions = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = sessions.sweep_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "Expired result sessions swept");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Session sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn manager() -> SessionManager<u32> {
        SessionManager::new(10, Duration::from_secs(600))
    }

    fn items(n: u32) -> Vec<u32> {
        (0..n).collect()
    }

    // ---- tokens ----

    #[test]
    fn test_token_round_trip() {
        let token = PageToken {
            direction: Direction::Next,
            owner: id("42"),
            page: 3,
        };
        assert_eq!(token.to_string(), "next|42|3");
        assert_eq!("next|42|3".parse::<PageToken>().unwrap(), token);
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        for raw in ["", "next|42", "next|42|3|9", "up|42|1", "next|abc|1", "prev|42|-1"] {
            assert!(
                matches!(raw.parse::<PageToken>(), Err(SessionError::MalformedToken(_))),
                "{:?} should be rejected",
                raw
            );
        }
    }

    // ---- create / page ----

    #[tokio::test]
    async fn test_create_serves_first_page() {
        let sessions = manager();
        let page = sessions.create(id("1"), items(25)).unwrap();
        assert_eq!(page.index, 0);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 25);
        assert_eq!(page.items, items(10));
    }

    #[tokio::test]
    async fn test_create_empty_rejected() {
        let sessions = manager();
        assert_eq!(sessions.create(id("1"), vec![]), Err(SessionError::Empty));
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_last_page_is_partial() {
        let sessions = manager();
        sessions.create(id("1"), items(25)).unwrap();
        let page = sessions.page(&id("1"), 2).unwrap();
        assert_eq!(page.items, vec![20, 21, 22, 23, 24]);
    }

    #[tokio::test]
    async fn test_page_index_is_clamped() {
        let sessions = manager();
        sessions.create(id("1"), items(30)).unwrap();
        assert_eq!(sessions.page(&id("1"), -1).unwrap().index, 0);
        assert_eq!(sessions.page(&id("1"), 5).unwrap().index, 2);
        assert_eq!(sessions.page(&id("1"), i64::MAX).unwrap().index, 2);
    }

    #[tokio::test]
    async fn test_advance_saturates() {
        let sessions = manager();
        sessions.create(id("1"), items(30)).unwrap();
        assert_eq!(sessions.advance(&id("1"), Direction::Prev).unwrap().index, 0);
        assert_eq!(sessions.advance(&id("1"), Direction::Next).unwrap().index, 1);
        assert_eq!(sessions.advance(&id("1"), Direction::Next).unwrap().index, 2);
        assert_eq!(sessions.advance(&id("1"), Direction::Next).unwrap().index, 2);
        assert_eq!(sessions.advance(&id("1"), Direction::Prev).unwrap().index, 1);
    }

    #[tokio::test]
    async fn test_navigate_uses_token_page() {
        let sessions = manager();
        sessions.create(id("1"), items(30)).unwrap();
        let page = sessions.navigate(&"next|1|1".parse().unwrap()).unwrap();
        assert_eq!(page.index, 2);
        let page = sessions.navigate(&"next|1|2".parse().unwrap()).unwrap();
        assert_eq!(page.index, 2);
        let page = sessions.navigate(&"prev|1|0".parse().unwrap()).unwrap();
        assert_eq!(page.index, 0);
    }

    #[tokio::test]
    async fn test_controls_disable_at_edges() {
        let sessions = manager();
        let first = sessions.create(id("7"), items(15)).unwrap();
        let controls = first.controls();
        assert!(controls.prev_disabled);
        assert!(!controls.next_disabled);
        assert_eq!(controls.next.to_string(), "next|7|0");

        let last = sessions.page(&id("7"), 1).unwrap();
        let controls = last.controls();
        assert!(!controls.prev_disabled);
        assert!(controls.next_disabled);
        assert_eq!(controls.prev.to_string(), "prev|7|1");
    }

    #[tokio::test]
    async fn test_missing_session_is_expired() {
        let sessions = manager();
        assert_eq!(
            sessions.page(&id("1"), 0),
            Err(SessionError::Expired(id("1")))
        );
        assert!(sessions.advance(&id("1"), Direction::Next).is_err());
    }

    #[tokio::test]
    async fn test_new_scan_replaces_session() {
        let sessions = manager();
        let first = sessions.create(id("1"), items(30)).unwrap();
        sessions.page(&id("1"), 2).unwrap();
        let second = sessions.create(id("1"), items(5)).unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(sessions.len(), 1);
        let page = sessions.advance(&id("1"), Direction::Next).unwrap();
        assert_eq!(page.index, 0);
        assert_eq!(page.total_items, 5);
    }

    #[tokio::test]
    async fn test_owners_are_independent() {
        let sessions = manager();
        sessions.create(id("1"), items(30)).unwrap();
        sessions.create(id("2"), items(3)).unwrap();
        sessions.page(&id("1"), 2).unwrap();
        assert_eq!(sessions.page(&id("2"), 2).unwrap().index, 0);
    }

    // ---- expiry ----

    #[tokio::test(start_paused = true)]
    async fn test_session_alive_before_ttl() {
        let sessions = manager();
        sessions.create(id("1"), items(3)).unwrap();
        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(sessions.page(&id("1"), 0).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expired_after_ttl() {
        let sessions = manager();
        sessions.create(id("1"), items(3)).unwrap();
        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(
            sessions.page(&id("1"), 0),
            Err(SessionError::Expired(id("1")))
        );
        assert!(sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_does_not_extend_ttl() {
        let sessions = manager();
        sessions.create(id("1"), items(3)).unwrap();
        tokio::time::advance(Duration::from_secs(500)).await;
        sessions.page(&id("1"), 0).unwrap();
        tokio::time::advance(Duration::from_secs(101)).await;
        assert!(sessions.page(&id("1"), 0).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let sessions = manager();
        sessions.create(id("1"), items(3)).unwrap();
        tokio::time::advance(Duration::from_secs(300)).await;
        sessions.create(id("2"), items(3)).unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(sessions.sweep_expired(), 1);
        assert!(sessions.page(&id("2"), 0).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_expiry_removes_session() {
        let sessions = Arc::new(manager());
        let page = sessions.create(id("1"), items(3)).unwrap();
        let timer = sessions.schedule_expiry(id("1"), page.session_id);
        timer.await.unwrap();
        assert!(sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_expiry_counts_from_scheduling() {
        let sessions = Arc::new(manager());
        let start = Instant::now();
        let page = sessions.create(id("1"), items(3)).unwrap();
        let timer = sessions.schedule_expiry(id("1"), page.session_id);

        // The clock moves before the timer task gets its first poll.
        tokio::time::advance(Duration::from_secs(600)).await;
        timer.await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(600));
        assert!(sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_remove_newer_session() {
        let sessions = Arc::new(manager());
        let first = sessions.create(id("1"), items(3)).unwrap();
        let stale = sessions.schedule_expiry(id("1"), first.session_id);

        tokio::time::advance(Duration::from_secs(300)).await;
        let second = sessions.create(id("1"), items(4)).unwrap();
        let _fresh = sessions.schedule_expiry(id("1"), second.session_id);

        stale.await.unwrap();
        let page = sessions.page(&id("1"), 0).unwrap();
        assert_eq!(page.session_id, second.session_id);
        assert_eq!(page.total_items, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_until_shutdown() {
        let sessions = Arc::new(manager());
        sessions.create(id("1"), items(3)).unwrap();
        let shutdown = CancellationToken::new();
        let sweeper = sessions.spawn_sweeper(Duration::from_secs(60), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(661)).await;
        assert!(sessions.is_empty());

        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[test]
    fn test_expire_instance_checks_identity() {
        let sessions = manager();
        let first = sessions.create(id("1"), items(3)).unwrap();
        let second = sessions.create(id("1"), items(3)).unwrap();
        assert!(!sessions.expire_instance(&id("1"), first.session_id));
        assert!(sessions.expire_instance(&id("1"), second.session_id));
        assert!(sessions.is_empty());
    }
}

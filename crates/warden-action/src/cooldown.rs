//! Per-user command cooldowns.
//!
//! Each (user, command) pair may be invoked at most once per window. Rejected
//! calls do not move the window. The table is swept of stale entries once it
//! grows past a soft cap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use warden_core::config::{CooldownConfig, PrivilegedConfig};
use warden_core::types::UserId;

use crate::error::CommandError;

type CooldownKey = (UserId, String);

/// Rate limiter keyed by (user, command name).
pub struct CooldownGate {
    window: Duration,
    soft_cap: usize,
    entries: Mutex<HashMap<CooldownKey, Instant>>,
}

impl CooldownGate {
    pub fn new(window: Duration, soft_cap: usize) -> Self {
        Self {
            window,
            soft_cap,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CooldownConfig) -> Self {
        Self::new(Duration::from_millis(config.window_ms), config.soft_cap)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CooldownKey, Instant>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the whole seconds left in the window, or 0 if the call is
    /// permitted (in which case the window restarts now).
    pub fn check(&self, owner: &UserId, operation: &str) -> u64 {
        let now = Instant::now();
        let mut entries = self.lock();
        let key = (owner.clone(), operation.to_string());

        if let Some(&last) = entries.get(&key) {
            let expires_at = last + self.window;
            if now < expires_at {
                return (expires_at - now).as_secs_f64().ceil() as u64;
            }
        }

        entries.insert(key, now);
        if entries.len() > self.soft_cap {
            let window = self.window;
            entries.retain(|_, last| now.duration_since(*last) < window);
            tracing::debug!(remaining = entries.len(), "Cooldown table swept");
        }
        0
    }

    /// [`check`](Self::check) as a `Result`.
    pub fn enforce(&self, owner: &UserId, operation: &str) -> Result<(), CommandError> {
        match self.check(owner, operation) {
            0 => Ok(()),
            remaining_secs => {
                tracing::debug!(owner = %owner, operation, remaining_secs, "Command rate limited");
                Err(CommandError::RateLimited { remaining_secs })
            }
        }
    }

    /// Drop entries whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, last| now.duration_since(*last) < self.window);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Cooldown bypass scoped to one designated identity.
///
/// The flag is toggled independently of the identity; with no identity
/// configured the override can never apply.
#[derive(Debug, Default)]
pub struct PrivilegedOverride {
    identity: Option<UserId>,
    enabled: AtomicBool,
}

impl PrivilegedOverride {
    pub fn new(identity: Option<UserId>, enabled: bool) -> Self {
        Self {
            identity,
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Build from config. An identity that is not a valid user id disables the override.
    pub fn from_config(config: &PrivilegedConfig) -> Self {
        let identity = config.identity.as_deref().and_then(|raw| {
            UserId::parse(raw)
                .map_err(|e| tracing::warn!(error = %e, "Ignoring privileged identity"))
                .ok()
        });
        Self::new(identity, config.enabled)
    }

    pub fn identity(&self) -> Option<&UserId> {
        self.identity.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "Privileged override toggled");
    }

    pub fn is_active_for(&self, caller: &UserId) -> bool {
        self.is_enabled() && self.identity.as_ref() == Some(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn gate() -> CooldownGate {
        CooldownGate::new(Duration::from_millis(5_000), 1_024)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_window_rejected() {
        let gate = gate();
        assert_eq!(gate.check(&id("1"), "scan"), 0);
        tokio::time::advance(Duration::from_millis(1_200)).await;
        assert_eq!(gate.check(&id("1"), "scan"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_rounds_up() {
        let gate = gate();
        gate.check(&id("1"), "scan");
        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert_eq!(gate.check(&id("1"), "scan"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_does_not_reset_window() {
        let gate = gate();
        gate.check(&id("1"), "scan");
        tokio::time::advance(Duration::from_millis(3_000)).await;
        assert!(gate.check(&id("1"), "scan") > 0);
        tokio::time::advance(Duration::from_millis(2_000)).await;
        assert_eq!(gate.check(&id("1"), "scan"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permitted_call_restarts_window() {
        let gate = gate();
        gate.check(&id("1"), "scan");
        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert_eq!(gate.check(&id("1"), "scan"), 0);
        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert_eq!(gate.check(&id("1"), "scan"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let gate = gate();
        assert_eq!(gate.check(&id("1"), "scan"), 0);
        assert_eq!(gate.check(&id("1"), "ban-all"), 0);
        assert_eq!(gate.check(&id("2"), "scan"), 0);
        assert!(gate.check(&id("1"), "scan") > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enforce_reports_remaining() {
        let gate = gate();
        gate.enforce(&id("1"), "scan").unwrap();
        let err = gate.enforce(&id("1"), "scan").unwrap_err();
        assert!(matches!(err, CommandError::RateLimited { remaining_secs: 5 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_stale_entries() {
        let gate = gate();
        gate.check(&id("1"), "scan");
        tokio::time::advance(Duration::from_millis(3_000)).await;
        gate.check(&id("2"), "scan");
        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(gate.sweep(), 1);
        assert_eq!(gate.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_cap_bounds_table() {
        let gate = CooldownGate::new(Duration::from_millis(5_000), 2);
        gate.check(&id("1"), "a");
        gate.check(&id("2"), "a");
        tokio::time::advance(Duration::from_millis(6_000)).await;
        gate.check(&id("3"), "a");
        assert_eq!(gate.len(), 1);
    }

    #[test]
    fn test_override_requires_identity_and_flag() {
        let over = PrivilegedOverride::new(Some(id("9")), false);
        assert!(!over.is_active_for(&id("9")));
        over.set_enabled(true);
        assert!(over.is_active_for(&id("9")));
        assert!(!over.is_active_for(&id("8")));
    }

    #[test]
    fn test_override_without_identity_never_applies() {
        let over = PrivilegedOverride::new(None, true);
        assert!(!over.is_active_for(&id("0")));
    }

    #[test]
    fn test_override_from_config_ignores_bad_identity() {
        let over = PrivilegedOverride::from_config(&PrivilegedConfig {
            identity: Some("admin".to_string()),
            enabled: true,
        });
        assert!(over.identity().is_none());

        let over = PrivilegedOverride::from_config(&PrivilegedConfig {
            identity: Some("77".to_string()),
            enabled: false,
        });
        assert_eq!(over.identity(), Some(&id("77")));
        assert!(!over.is_enabled());
    }
}

//! Append-only moderation audit log.
//!
//! Write-only sink for operators; nothing in Warden reads it back.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use warden_core::types::Actor;

/// Kind of moderation action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Ban,
    WarningDm,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::Ban => write!(f, "BAN"),
            AuditAction::WarningDm => write!(f, "WARNING_DM"),
        }
    }
}

/// One audit record.
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub action: AuditAction,
    pub executor: &'a Actor,
    pub target: &'a Actor,
    pub reason: &'a str,
}

impl AuditEntry<'_> {
    /// Render the entry as a log line, including the trailing newline.
    pub fn format_line(&self, at: DateTime<Utc>) -> String {
        format!(
            "[{}] {} | Executor: {} ({}) | Target: {} ({}) | Reason: {}\n",
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.action,
            self.executor.tag,
            self.executor.id,
            self.target.tag,
            self.target.id,
            self.reason
        )
    }
}

/// File-backed audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry stamped with the current time.
    pub fn record(&self, entry: &AuditEntry<'_>) -> std::io::Result<()> {
        let line = entry.format_line(Utc::now());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        tracing::debug!(action = %entry.action, target = %entry.target.id, "Audit entry written");
        Ok(())
    }
}

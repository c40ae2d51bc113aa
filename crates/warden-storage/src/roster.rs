//! Flagged-identity roster backed by a flat text file.
//!
//! One record per line: `<id> <display_name> <origin_server>`, where the id is
//! a run of digits, the display name a single token and the origin server the
//! rest of the line. Additions are appended; removals rewrite the whole file.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use warden_core::types::{FlaggedIdentity, UserId};

use crate::error::RosterError;

static RECORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)\s+(\S+)\s+(.+)$").unwrap());

/// Parse a single roster line. Returns `None` for lines of the wrong shape.
pub fn parse_record(line: &str) -> Option<FlaggedIdentity> {
    let caps = RECORD_RE.captures(line)?;
    let id = UserId::parse(&caps[1]).ok()?;
    Some(FlaggedIdentity {
        id,
        display_name: caps[2].to_string(),
        origin_server: caps[3].to_string(),
    })
}

/// Render an identity as a roster line (no trailing newline).
pub fn format_record(identity: &FlaggedIdentity) -> String {
    format!(
        "{} {} {}",
        identity.id, identity.display_name, identity.origin_server
    )
}

/// In-memory roster synchronized with its backing file.
///
/// Entries keep the order they were read or added in.
#[derive(Debug)]
pub struct RosterStore {
    path: PathBuf,
    entries: Vec<FlaggedIdentity>,
    index: HashMap<UserId, usize>,
}

impl RosterStore {
    /// Create an empty store for `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Create a store and load it immediately.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RosterError> {
        let mut store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the backing file, replacing the in-memory roster wholesale.
    ///
    /// A missing file is created empty. Any other read failure leaves the
    /// current roster untouched.
    pub fn load(&mut self) -> Result<usize, RosterError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Roster file not found, creating it");
                self.create_empty()?;
                String::new()
            }
            Err(source) => {
                tracing::error!(path = %self.path.display(), error = %source, "Failed to read roster");
                return Err(RosterError::Load {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut entries: Vec<FlaggedIdentity> = Vec::new();
        let mut index: HashMap<UserId, usize> = HashMap::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let Some(identity) = parse_record(line) else {
                tracing::debug!(line = %line, "Skipping malformed roster line");
                continue;
            };
            // Later lines win but keep the first line's position.
            match index.get(&identity.id) {
                Some(&pos) => entries[pos] = identity,
                None => {
                    index.insert(identity.id.clone(), entries.len());
                    entries.push(identity);
                }
            }
        }

        self.entries = entries;
        self.index = index;
        tracing::info!(count = self.entries.len(), path = %self.path.display(), "Roster loaded");
        Ok(self.entries.len())
    }

    fn create_empty(&self) -> Result<(), RosterError> {
        let result = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
            _ => Ok(()),
        }
        .and_then(|_| std::fs::write(&self.path, ""));

        result.map_err(|source| RosterError::Load {
            path: self.path.clone(),
            source,
        })
    }

    pub fn has(&self, id: &UserId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &UserId) -> Option<&FlaggedIdentity> {
        self.index.get(id).map(|&pos| &self.entries[pos])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate identities in file order.
    pub fn iter(&self) -> impl Iterator<Item = &FlaggedIdentity> {
        self.entries.iter()
    }

    /// Add an identity and append it to the backing file.
    ///
    /// If the append fails the in-memory entry is kept and the error is
    /// returned; a later [`load`](Self::load) reconciles the two.
    pub fn add(
        &mut self,
        id: UserId,
        display_name: &str,
        origin_server: &str,
    ) -> Result<&FlaggedIdentity, RosterError> {
        if self.has(&id) {
            return Err(RosterError::DuplicateKey(id));
        }
        validate_fields(display_name, origin_server)?;

        let identity = FlaggedIdentity {
            id: id.clone(),
            display_name: display_name.to_string(),
            origin_server: origin_server.to_string(),
        };
        let line = format!("\n{}", format_record(&identity));

        let pos = self.entries.len();
        self.index.insert(id.clone(), pos);
        self.entries.push(identity);

        if let Err(e) = self.append_line(&line) {
            tracing::error!(user_id = %id, error = %e, "Failed to append roster entry");
            return Err(RosterError::Persist(e));
        }

        tracing::info!(user_id = %id, "Roster entry added");
        Ok(&self.entries[pos])
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Remove an identity and rewrite the backing file from what remains.
    pub fn remove(&mut self, id: &UserId) -> Result<FlaggedIdentity, RosterError> {
        let pos = self
            .index
            .remove(id)
            .ok_or_else(|| RosterError::NotFound(id.clone()))?;
        let removed = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }

        if let Err(e) = self.rewrite() {
            tracing::error!(user_id = %id, error = %e, "Failed to rewrite roster file");
            return Err(RosterError::Persist(e));
        }

        tracing::info!(user_id = %id, "Roster entry removed");
        Ok(removed)
    }

    fn rewrite(&self) -> std::io::Result<()> {
        let content = self
            .entries
            .iter()
            .map(format_record)
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(&self.path, content)
    }

    /// Modification time of the backing file, if it can be read.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(time) => Some(DateTime::<Utc>::from(time)),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Roster mtime unavailable");
                None
            }
        }
    }
}

fn validate_fields(display_name: &str, origin_server: &str) -> Result<(), RosterError> {
    if display_name.is_empty() || display_name.chars().any(char::is_whitespace) {
        return Err(RosterError::InvalidRecord(
            "display name must be a single word".to_string(),
        ));
    }
    if origin_server.trim().is_empty() {
        return Err(RosterError::InvalidRecord(
            "origin server must not be empty".to_string(),
        ));
    }
    if origin_server.starts_with(char::is_whitespace) || origin_server.contains(['\n', '\r']) {
        return Err(RosterError::InvalidRecord(
            "origin server must be a single line without leading spaces".to_string(),
        ));
    }
    Ok(())
}

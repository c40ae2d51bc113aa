use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, WardenError};

/// Top-level configuration for the Warden application.
///
/// Loaded from `~/.warden/config.toml` by default. Each section corresponds
/// to one component of the moderation engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub privileged: PrivilegedConfig,
}

impl WardenConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: WardenConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Resolve a file path from this config against the data directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve_path(&self, file: &str) -> PathBuf {
        let path = PathBuf::from(file);
        if path.is_absolute() {
            path
        } else {
            PathBuf::from(&self.general.data_dir).join(path)
        }
    }

    /// Location of the roster file.
    pub fn roster_path(&self) -> PathBuf {
        self.resolve_path(&self.roster.path)
    }

    /// Location of the audit log.
    pub fn audit_path(&self) -> PathBuf {
        self.resolve_path(&self.audit.path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory relative file paths are resolved against.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Flagged-identity roster file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub path: String,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            path: "iddatabase.txt".to_string(),
        }
    }
}

/// Moderation audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: "moderation_logs.txt".to_string(),
        }
    }
}

/// Per-user command cooldown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Minimum interval between invocations of one command by one user.
    pub window_ms: u64,
    /// Table size above which expired entries are swept on insert.
    pub soft_cap: usize,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            window_ms: 5_000,
            soft_cap: 1_024,
        }
    }
}

/// Paginated scan-result sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub page_size: usize,
    /// Fixed lifetime of a session, counted from creation.
    pub ttl_secs: u64,
    /// How often the sweeper drops expired sessions.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

/// Sequential batch action runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pause after each action attempt.
    pub delay_ms: u64,
    /// Progress is reported after every N completed attempts.
    pub progress_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1_000,
            progress_every: 5,
        }
    }
}

/// Cooldown bypass for one designated identity. Disabled by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegedConfig {
    pub identity: Option<String>,
    pub enabled: bool,
}

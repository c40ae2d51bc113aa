//! CLI argument definitions for the Warden console.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use warden_core::config::WardenConfig;

/// Warden: roster-driven moderation for a chat server, run from a console.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Directory the roster and audit log paths are resolved against.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// JSON file with the server membership snapshot.
    #[arg(short = 'm', long = "members")]
    pub members: Option<PathBuf>,

    /// Name of the moderated server.
    #[arg(long = "guild", default_value = "Guild")]
    pub guild: String,

    /// User id commands are issued as.
    #[arg(long = "caller", default_value = "0")]
    pub caller: String,

    /// Display tag of the caller.
    #[arg(long = "caller-tag", default_value = "console")]
    pub caller_tag: String,

    /// Issue commands with administrator permissions.
    #[arg(long = "admin")]
    pub admin: bool,

    /// Print command results as JSON.
    #[arg(long = "json")]
    pub json: bool,

    /// Write the effective configuration to the config path and exit.
    #[arg(long = "write-config")]
    pub write_config: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > WARDEN_CONFIG env var > ~/.warden/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply command-line overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut WardenConfig) {
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".warden").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".warden").join("config.toml");
    }
    PathBuf::from("config.toml")
}

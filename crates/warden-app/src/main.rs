//! Warden console binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Open the roster and audit log under the data directory
//! 3. Load the membership snapshot into the in-memory platform
//! 4. Build the moderation engine and command dispatcher
//! 5. Read commands from stdin until `quit`, EOF or Ctrl-C

mod cli;
mod render;
mod repl;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use warden_action::{
    CommandContext, Dispatcher, InMemoryPlatform, ModerationEngine, Permissions, Reply,
};
use warden_core::config::WardenConfig;
use warden_core::types::{Actor, MembershipRecord, UserId};
use warden_storage::{AuditLog, RosterStore};

use cli::CliArgs;
use repl::Input;

/// Read the membership snapshot: a JSON array of `{ id, is_bot, display_tag }`.
fn load_members(path: &Path) -> Result<Vec<MembershipRecord>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let members: Vec<MembershipRecord> = serde_json::from_str(&content)?;
    Ok(members)
}

fn print_reply(reply: &Reply, json: bool) {
    if json {
        match render::render_json(reply) {
            Ok(text) => println!("{}", text),
            Err(e) => tracing::error!(error = %e, "Failed to serialize reply"),
        }
    } else {
        println!("{}", render::render_text(reply));
    }
}

fn log_task_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Command task ended abnormally");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = WardenConfig::load_or_default(&config_file);
    args.apply_overrides(&mut config);

    if args.write_config {
        config.save(&config_file)?;
        println!("Configuration written to {}", config_file.display());
        return Ok(());
    }

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Warden v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let roster_path = config.roster_path();
    let mut roster = RosterStore::new(&roster_path);
    match roster.load() {
        Ok(count) => tracing::info!(path = %roster_path.display(), count, "Roster loaded"),
        Err(e) => tracing::warn!(error = %e, "Roster unavailable; scans will retry the load"),
    }
    let audit = AuditLog::new(config.audit_path());

    // Platform.
    let members = match args.members {
        Some(ref path) => {
            let members = load_members(path)?;
            tracing::info!(path = %path.display(), count = members.len(), "Membership snapshot loaded");
            members
        }
        None => {
            tracing::warn!("No --members file given; the server starts empty");
            Vec::new()
        }
    };
    let platform = Arc::new(InMemoryPlatform::new(args.guild.clone(), members));

    // Engine.
    let engine = Arc::new(ModerationEngine::new(platform, roster, audit, &config));
    let dispatcher = Arc::new(Dispatcher::from_config(Arc::clone(&engine), &config));

    let shutdown = CancellationToken::new();
    let sweeper = engine.sessions().spawn_sweeper(
        Duration::from_secs(config.session.sweep_interval_secs),
        shutdown.clone(),
    );

    let caller = Actor::new(UserId::parse(&args.caller)?, args.caller_tag.clone());
    let permissions = if args.admin {
        Permissions::admin()
    } else {
        Permissions::moderator()
    };
    tracing::info!(caller = %caller.id, admin = args.admin, "Console ready");

    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        // Reap finished command tasks.
        while let Some(result) = tasks.try_join_next() {
            log_task_result(result);
        }

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else { break };

        let command = match repl::parse_line(&line) {
            Ok(Some(Input::Command(command))) => command,
            Ok(Some(Input::Quit)) => break,
            Ok(None) => continue,
            Err(usage) => {
                eprintln!("{}", usage.trim_end());
                continue;
            }
        };

        // Commands run on their own tasks so `cancel` can reach a running batch.
        let ctx = CommandContext {
            caller: caller.clone(),
            permissions,
        };
        let dispatcher = Arc::clone(&dispatcher);
        let json = args.json;
        tasks.spawn(async move {
            let reply = dispatcher
                .handle(ctx, command, |done, total| {
                    eprintln!("Progress: {}/{}", done, total);
                })
                .await;
            print_reply(&reply, json);
        });
    }

    // Stop any batch still running for the console caller, then drain
    // in-flight commands.
    engine.cancel_batch(&caller.id);
    while let Some(result) = tasks.join_next().await {
        log_task_result(result);
    }
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Session sweeper ended abnormally");
    }
    tracing::info!("Warden stopped");
    Ok(())
}

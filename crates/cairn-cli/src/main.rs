//! # cairn
//!
//! Command-line front end: inspect and edit stored sessions, manage the
//! sync account, and run syncs by hand.

#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use cairn_settings::load_settings;
use cairn_storage::{StorageDeps, StorageOrchestrator};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

/// Cairn session store.
#[derive(Parser, Debug)]
#[command(name = "cairn", version, about = "Cairn session store and account sync")]
struct Cli {
    /// Data directory (overrides settings and `CAIRN_DATA_DIR`).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Print machine-readable JSON where supported.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect and edit stored sessions.
    #[command(subcommand)]
    Sessions(SessionsCommand),

    /// Start a new session.
    New {
        /// Session kind.
        mode: ModeArg,
        /// Project directory for the session.
        #[arg(long)]
        project: Option<String>,
    },

    /// Append a message to a session (the most recent one by default).
    Say {
        /// Author of the message.
        role: RoleArg,
        /// Message text.
        text: String,
        /// Target session id.
        #[arg(long)]
        session: Option<String>,
    },

    /// Manage the sync account.
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Synchronize with remote storage.
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Manage stored credentials.
    #[command(subcommand)]
    Credentials(CredentialsCommand),

    /// Delete every session (and with `--full`, every credential).
    Reset {
        /// Also delete stored credentials.
        #[arg(long)]
        full: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// List sessions, most recent first.
    List,
    /// Print a session with its messages.
    Show {
        /// Session id.
        id: String,
    },
    /// Delete a session.
    Delete {
        /// Session id.
        id: String,
    },
    /// Change a session's title.
    Rename {
        /// Session id.
        id: String,
        /// New title.
        title: String,
    },
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Sign in through the browser.
    Login,
    /// Sign out and forget tokens.
    Logout,
    /// Show whether an account is signed in.
    Status,
    /// Store the OAuth client id and secret.
    Client {
        /// OAuth client id.
        client_id: String,
        /// OAuth client secret.
        client_secret: String,
    },
}

#[derive(Subcommand, Debug)]
enum SyncCommand {
    /// Pull then push now.
    Now,
    /// Show account and last sync time.
    Status,
    /// List the sessions stored remotely.
    Remote,
}

#[derive(Subcommand, Debug)]
enum CredentialsCommand {
    /// Store a credential.
    Set {
        /// Credential name.
        name: String,
        /// Credential value.
        value: String,
    },
    /// Print a credential's value.
    Get {
        /// Credential name.
        name: String,
    },
    /// Delete a credential.
    Delete {
        /// Credential name.
        name: String,
    },
    /// List credential names.
    List,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    NewBuild,
    ExistingProject,
    Chat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    User,
    Assistant,
    System,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings().context("failed to load settings")?;
    if let Some(dir) = &cli.data_dir {
        settings.storage.data_dir = Some(dir.display().to_string());
    }
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| settings.logging.level.clone());
    if cli.log_json {
        cairn_core::logging::init_json_subscriber(&level);
    } else {
        cairn_core::logging::init_subscriber(&level);
    }

    let deps = StorageDeps::system(&settings);
    let storage = StorageOrchestrator::init(&settings, deps)
        .await
        .context("failed to open storage")?;

    let result = commands::run(&storage, cli.command, cli.json).await;

    // Changes made by this invocation would otherwise wait for a debounce
    // timer that never fires.
    if let Err(e) = storage.flush_pending_push().await {
        warn!(error = %e, "could not push pending changes");
    }

    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

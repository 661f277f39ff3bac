//! Command handlers.

use anyhow::{Context, Result, bail};
use cairn_core::time::format_minute;
use cairn_storage::{NewMessage, StorageOrchestrator};
use cairn_store::{Role, SessionMode, SessionSummary};
use serde::Serialize;

use crate::{AuthCommand, Command, CredentialsCommand, ModeArg, RoleArg, SessionsCommand, SyncCommand};

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::NewBuild => Self::NewBuild,
            ModeArg::ExistingProject => Self::ExistingProject,
            ModeArg::Chat => Self::Chat,
        }
    }
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Self::User,
            RoleArg::Assistant => Self::Assistant,
            RoleArg::System => Self::System,
        }
    }
}

/// Execute one parsed command.
pub async fn run(storage: &StorageOrchestrator, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Sessions(cmd) => sessions(storage, cmd, json).await,
        Command::New { mode, project } => {
            let session = storage.create_session(mode.into(), project).await?;
            if json {
                print_json(&session)
            } else {
                println!("{}  {}", session.id, session.title);
                Ok(())
            }
        }
        Command::Say {
            role,
            text,
            session,
        } => say(storage, role.into(), text, session).await,
        Command::Auth(cmd) => auth(storage, cmd, json).await,
        Command::Sync(cmd) => sync(storage, cmd, json).await,
        Command::Credentials(cmd) => credentials(storage, cmd, json).await,
        Command::Reset { full } => {
            if full {
                storage.full_reset().await?;
                println!("deleted all sessions and credentials");
            } else {
                storage.clear_all().await?;
                println!("deleted all sessions");
            }
            Ok(())
        }
    }
}

async fn sessions(storage: &StorageOrchestrator, cmd: SessionsCommand, json: bool) -> Result<()> {
    match cmd {
        SessionsCommand::List => {
            let sessions = storage.list_sessions().await?;
            if json {
                return print_json(&sessions);
            }
            if sessions.is_empty() {
                println!("no sessions ({} storage)", storage.backend_kind());
            }
            for summary in &sessions {
                println!("{}", summary_line(summary));
            }
            Ok(())
        }
        SessionsCommand::Show { id } => {
            let session = storage
                .load_session(&id)
                .await?
                .with_context(|| format!("no session {id}"))?;
            if json {
                return print_json(&session);
            }
            println!("{}", session.title);
            println!(
                "{}  {}  created {}  updated {}",
                session.id,
                session.mode,
                format_minute(session.created_at),
                format_minute(session.updated_at)
            );
            if let Some(path) = &session.project_path {
                println!("project: {path}");
            }
            for message in &session.messages {
                println!();
                println!("[{}] {} ({})", format_minute(message.timestamp), message.role, message.kind);
                println!("{}", message.content);
            }
            Ok(())
        }
        SessionsCommand::Delete { id } => {
            if !storage.delete_session(&id).await? {
                bail!("no session {id}");
            }
            println!("deleted {id}");
            Ok(())
        }
        SessionsCommand::Rename { id, title } => {
            let session = storage.rename_session(&id, &title).await?;
            println!("{}  {}", session.id, session.title);
            Ok(())
        }
    }
}

async fn say(
    storage: &StorageOrchestrator,
    role: Role,
    text: String,
    session: Option<String>,
) -> Result<()> {
    let id = match session {
        Some(id) => id,
        None => storage
            .list_sessions()
            .await?
            .into_iter()
            .next()
            .map(|s| s.id)
            .context("no sessions yet; start one with `cairn new <mode>`")?,
    };
    let _ = storage
        .load_session(&id)
        .await?
        .with_context(|| format!("no session {id}"))?;
    let message = storage.add_message(NewMessage::text(role, text)).await?;
    println!("{}  {}", id, message.id);
    Ok(())
}

async fn auth(storage: &StorageOrchestrator, cmd: AuthCommand, json: bool) -> Result<()> {
    match cmd {
        AuthCommand::Login => {
            println!("opening the browser to sign in...");
            let status = storage.sign_in().await?;
            println!(
                "signed in as {}",
                status.display_name.as_deref().unwrap_or("unknown account")
            );
        }
        AuthCommand::Logout => {
            storage.sign_out().await?;
            println!("signed out");
        }
        AuthCommand::Status => {
            let status = storage.auth_status()?;
            if json {
                return print_json(&status);
            }
            match (status.signed_in, status.display_name) {
                (true, Some(name)) => println!("signed in as {name}"),
                (true, None) => println!("signed in"),
                (false, _) => println!("not signed in"),
            }
        }
        AuthCommand::Client {
            client_id,
            client_secret,
        } => {
            storage.set_client_credentials(&client_id, &client_secret)?;
            println!("stored OAuth client credentials");
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncStatus {
    signed_in: bool,
    display_name: Option<String>,
    backend: String,
    last_sync: Option<i64>,
}

async fn sync(storage: &StorageOrchestrator, cmd: SyncCommand, json: bool) -> Result<()> {
    match cmd {
        SyncCommand::Now => {
            let outcome = storage.sync_now().await?;
            if json {
                return print_json(&outcome);
            }
            println!("sync complete: {outcome:?}");
        }
        SyncCommand::Status => {
            let auth = storage.auth_status()?;
            let status = SyncStatus {
                signed_in: auth.signed_in,
                display_name: auth.display_name,
                backend: storage.backend_kind().to_string(),
                last_sync: storage.last_sync_time(),
            };
            if json {
                return print_json(&status);
            }
            println!("account: {}", if status.signed_in { "signed in" } else { "signed out" });
            if let Some(name) = &status.display_name {
                println!("name:    {name}");
            }
            println!("backend: {}", status.backend);
            match status.last_sync {
                Some(ms) => println!("last sync: {}", format_minute(ms)),
                None => println!("last sync: not in this process"),
            }
        }
        SyncCommand::Remote => {
            let Some(index) = storage.remote_index().await? else {
                println!("nothing stored remotely yet");
                return Ok(());
            };
            if json {
                return print_json(&index);
            }
            println!("remote index updated {}", format_minute(index.updated_at));
            for summary in &index.sessions {
                println!("{}", summary_line(summary));
            }
        }
    }
    Ok(())
}

async fn credentials(
    storage: &StorageOrchestrator,
    cmd: CredentialsCommand,
    json: bool,
) -> Result<()> {
    match cmd {
        CredentialsCommand::Set { name, value } => {
            storage.save_credential(&name, &value).await?;
            println!("stored {name}");
        }
        CredentialsCommand::Get { name } => {
            let value = storage
                .get_credential(&name)
                .await?
                .with_context(|| format!("no credential {name}"))?;
            println!("{value}");
        }
        CredentialsCommand::Delete { name } => {
            if !storage.delete_credential(&name).await? {
                bail!("no credential {name}");
            }
            println!("deleted {name}");
        }
        CredentialsCommand::List => {
            let list = storage.list_credentials().await?;
            if json {
                return print_json(&list);
            }
            for info in &list {
                println!("{}  (updated {})", info.name, format_minute(info.updated_at));
            }
        }
    }
    Ok(())
}

fn summary_line(summary: &SessionSummary) -> String {
    format!(
        "{}  {}  {:>4} msgs  {}",
        summary.id,
        format_minute(summary.updated_at),
        summary.message_count,
        summary.title
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! `emre` - terminal client for the EmRe coordination backend.

mod cli;
mod display;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use emre_core::api::{HistoryRange, IncidentFilter, OrganizationFilter, ResourceFilter};
use emre_core::auth::{CredentialStore, Session, SessionFile, StoredSession};
use emre_core::models::{NewIncident, NewIncidentUpdate};
use emre_core::{Config, EmreClient};

use cli::{Cli, Commands, IncidentCommands, ResourceCommands};

/// Stderr logging, plus a daily rolling file when `EMRE_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match std::env::var_os("EMRE_LOG_DIR").map(PathBuf::from) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "emre.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

/// Rebuild the session from the metadata file and the keychain token.
fn restore_session(session_file: &SessionFile) -> Session {
    let stored = match session_file.load() {
        Ok(Some(stored)) if !stored.is_expired() => stored,
        Ok(Some(_)) => {
            debug!("Stored session expired");
            return Session::new();
        }
        Ok(None) => return Session::new(),
        Err(e) => {
            warn!("Ignoring unreadable session file: {:#}", e);
            return Session::new();
        }
    };

    match CredentialStore::load_token(&stored.username) {
        Ok(Some(token)) => Session::with_data(stored.with_token(token)),
        Ok(None) => Session::new(),
        Err(e) => {
            warn!("Keychain unavailable: {:#}", e);
            Session::new()
        }
    }
}

fn print<T: Serialize>(json: bool, value: &T, table: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", table());
    }
    Ok(())
}

fn read_password() -> Result<String> {
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    let session_file = SessionFile::new(config.cache_dir()?);
    let session = restore_session(&session_file);
    let client = EmreClient::from_config(&config, session)?;
    let json = cli.json;

    let result = dispatch(cli.command, &client, &mut config, &session_file, json).await;

    // A 401 clears the in-memory session; drop the persisted copy too.
    if !client.session().is_authenticated() {
        session_file.clear()?;
    }
    result
}

async fn dispatch(
    command: Commands,
    client: &EmreClient,
    config: &mut Config,
    session_file: &SessionFile,
    json: bool,
) -> Result<()> {
    match command {
        Commands::Login { username } => {
            let username = match username.or_else(|| config.last_username.clone()) {
                Some(username) => username,
                None => anyhow::bail!("No username given; pass --username or set EMRE_USERNAME"),
            };
            let password = read_password()?;
            let data = client.login(&username, &password).await?;

            CredentialStore::save_token(&username, &data.token)?;
            if let Some(stored) = StoredSession::from_data(&data) {
                session_file.save(&stored)?;
            }
            config.last_username = Some(username.clone());
            config.save()?;
            info!(username = %username, "Session stored");
            println!("Logged in as {}", username);
        }

        Commands::Logout => {
            if let Some(username) = client.session().data().and_then(|d| d.username) {
                CredentialStore::forget(&username)?;
            }
            client.logout();
            session_file.clear()?;
            println!("Logged out");
        }

        Commands::Whoami => {
            let user = client.current_user().await?;
            print(json, &user, || format!("{}\n", display::user(&user)))?;
        }

        Commands::Orgs {
            search,
            org_type,
            visibility,
        } => {
            let filter = OrganizationFilter {
                search,
                org_type,
                visibility,
            };
            let orgs = client.organizations(&filter).await?;
            print(json, &orgs, || display::organizations(&orgs))?;
        }

        Commands::Org { id } => {
            let detail = client.organization(id).await?;
            print(json, &detail, || display::organization(&detail))?;
        }

        Commands::Incidents {
            org,
            team,
            status,
            priority,
            incident_type,
        } => {
            let filter = IncidentFilter {
                organization_id: org,
                team_id: team,
                status,
                priority,
                incident_type,
            };
            let incidents = client.incidents(&filter).await?;
            print(json, &incidents, || display::incidents(&incidents))?;
        }

        Commands::Incident { command } => incident_command(command, client, json).await?,

        Commands::Resources { command } => resource_command(command, client, json).await?,
    }
    Ok(())
}

async fn incident_command(command: IncidentCommands, client: &EmreClient, json: bool) -> Result<()> {
    let id = match command {
        IncidentCommands::Show { id } => id,
        IncidentCommands::Create {
            org,
            title,
            incident_type,
            priority,
            description,
            location,
        } => {
            let incident = client
                .create_incident(NewIncident {
                    title,
                    description,
                    incident_type,
                    priority,
                    latitude: None,
                    longitude: None,
                    location_description: location,
                    organization_id: org,
                    assigned_team_id: None,
                })
                .await?;
            incident.id
        }
        IncidentCommands::Start { id } => {
            client.start_incident(id).await?;
            id
        }
        IncidentCommands::Update { id, content } => {
            client
                .add_incident_update(id, NewIncidentUpdate::general(content))
                .await?;
            id
        }
        IncidentCommands::Resolve { id, notes } => {
            client.resolve_incident(id, &notes).await?;
            id
        }
        IncidentCommands::Close { id, notes } => {
            client.close_incident(id, &notes).await?;
            id
        }
        IncidentCommands::Reopen { id, reason } => {
            client.reopen_incident(id, &reason).await?;
            id
        }
    };

    let incident = client.incident(id).await?;
    let updates = client.incident_updates(id).await?;
    if json {
        let value = serde_json::json!({ "incident": incident, "updates": updates });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", display::incident(&incident, &updates));
    }
    Ok(())
}

async fn resource_command(command: ResourceCommands, client: &EmreClient, json: bool) -> Result<()> {
    match command {
        ResourceCommands::List {
            org,
            team,
            resource_type,
            status,
        } => {
            let filter = ResourceFilter {
                organization_id: org,
                team_id: team,
                resource_type,
                status,
            };
            let resources = client.resources(&filter).await?;
            print(json, &resources, || display::resources(&resources))?;
        }
        ResourceCommands::Assign {
            incident,
            resource,
            quantity,
            notes,
        } => {
            client
                .assign_resource(incident, resource, quantity, notes)
                .await?;
            let updated = client.resource(resource).await?;
            print(json, &updated, || display::resources(std::slice::from_ref(&updated)))?;
        }
        ResourceCommands::Return {
            incident,
            resource,
            notes,
        } => {
            client.return_resource(incident, resource, notes).await?;
            let updated = client.resource(resource).await?;
            print(json, &updated, || display::resources(std::slice::from_ref(&updated)))?;
        }
        ResourceCommands::History { id, from, to } => {
            let range = HistoryRange {
                start_date: from,
                end_date: to,
            };
            let entries = client.resource_history(id, &range).await?;
            print(json, &entries, || display::resource_history(&entries))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

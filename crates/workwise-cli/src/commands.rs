use std::io::{self, Write};

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info, warn};
use workwise_core::auth::CredentialStore;
use workwise_core::models::{notification, DepartmentInput, MachineInput, NewAccount};
use workwise_core::{ApiClient, AuthEvent, AuthState, Config, Session};

use crate::cli::{Command, DepartmentArgs, DepartmentCommand, MachineArgs, MachineCommand};

/// Environment variable supplying a default login username
const USERNAME_ENV: &str = "WORKWISE_USERNAME";

pub struct App {
    pub config: Config,
    pub api: ApiClient,
}

impl App {
    /// `api_url` (from `--api-url`) applies to this run only and is never
    /// saved into the config file.
    pub fn new(config: Config, api_url: Option<String>) -> Result<Self> {
        let session = match config.cache_dir() {
            Ok(dir) => {
                let mut session = Session::new(dir);
                if let Err(e) = session.load() {
                    warn!(error = %e, "Ignoring unreadable session file");
                }
                session
            }
            Err(e) => {
                warn!(error = %e, "No cache directory, session will not persist");
                Session::in_memory()
            }
        };

        Self::with_session(config, api_url, session)
    }

    pub fn with_session(config: Config, api_url: Option<String>, session: Session) -> Result<Self> {
        let api = match api_url {
            Some(url) => ApiClient::new(&url, config.request_timeout(), session)?,
            None => ApiClient::from_config(&config, session)?,
        };
        debug!(base_url = api.base_url(), state = ?api.state(), "Client ready");
        Ok(Self { config, api })
    }
}

pub async fn run(app: &mut App, command: Command) -> Result<()> {
    let mut events = app.api.subscribe();
    let result = dispatch(app, command).await;
    report_login_required(&mut events);
    result
}

async fn dispatch(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Login { username, remember, ask } => login(app, username, remember, ask).await,
        Command::Register { username, email } => register(app, username, email).await,
        Command::Logout { forget } => logout(app, forget),
        Command::Status => status(app),
        Command::Departments(cmd) => departments(&app.api, cmd).await,
        Command::Machines(cmd) => machines(&app.api, cmd).await,
        Command::Tickets => print_json(&app.api.get_tickets().await?),
        Command::Jobs => print_json(&app.api.get_jobs().await?),
        Command::Notifications { unread } => {
            let mut notifications = app.api.get_notifications().await?;
            info!(unread = notification::unread_count(&notifications), "Notifications fetched");
            if unread {
                notifications.retain(|n| !n.is_read);
            }
            print_json(&notifications)
        }
        Command::Users { id: Some(id) } => print_json(&app.api.get_user(id).await?),
        Command::Users { id: None } => print_json(&app.api.get_users().await?),
    }
}

/// The CLI's login entry point: tell the user where to go when the
/// client says the session is gone.
fn report_login_required(events: &mut Receiver<AuthEvent>) {
    while let Ok(event) = events.try_recv() {
        if event == AuthEvent::LoginRequired {
            eprintln!("Session expired or not logged in. Run `workwise login` to continue.");
            return;
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{}", out);
    Ok(())
}

// ===== Session Commands =====

async fn login(app: &mut App, username: Option<String>, remember: bool, ask: bool) -> Result<()> {
    let username = match username
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .or_else(|| app.config.last_username.clone())
    {
        Some(u) if !u.trim().is_empty() => u.trim().to_string(),
        _ => prompt_username()?,
    };

    let password = if !ask && CredentialStore::has_credentials(&username) {
        debug!(username = %username, "Using password from keychain");
        CredentialStore::get_password(&username)?
    } else {
        rpassword::prompt_password("Password: ").context("Failed to read password")?
    };

    app.api.login(&username, &password).await?;

    if remember {
        if let Err(e) = CredentialStore::store(&username, &password) {
            warn!(error = %e, "Could not save password to keychain");
        }
    }
    remember_username(app, &username);
    println!("Logged in as {}", username);
    Ok(())
}

async fn register(app: &mut App, username: String, email: Option<String>) -> Result<()> {
    let password = rpassword::prompt_password("Choose a password: ")
        .context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Confirm password: ")
        .context("Failed to read password")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let account = NewAccount {
        username: username.clone(),
        password,
        email,
    };
    app.api.register(&account).await?;
    remember_username(app, &username);
    println!("Registered and logged in as {}", username);
    Ok(())
}

fn logout(app: &mut App, forget: bool) -> Result<()> {
    let username = app.api.username().or_else(|| app.config.last_username.clone());
    app.api.logout()?;

    if forget {
        if let Some(ref username) = username {
            CredentialStore::delete(username)?;
        }
    }
    println!("Logged out");
    Ok(())
}

fn status(app: &App) -> Result<()> {
    let state = match app.api.state() {
        AuthState::LoggedIn => "logged_in",
        AuthState::LoggedOut => "logged_out",
    };
    print_json(&json!({
        "state": state,
        "username": app.api.username(),
        "api_base_url": app.api.base_url(),
    }))
}

fn remember_username(app: &mut App, username: &str) {
    app.config.last_username = Some(username.to_string());
    if let Err(e) = app.config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("Username is required");
    }
    Ok(input.to_string())
}

// ===== Resource Commands =====

impl From<DepartmentArgs> for DepartmentInput {
    fn from(args: DepartmentArgs) -> Self {
        DepartmentInput {
            name: args.name,
            description: args.description,
        }
    }
}

impl From<MachineArgs> for MachineInput {
    fn from(args: MachineArgs) -> Self {
        MachineInput {
            name: args.name,
            model_number: args.model_number,
            location: args.location,
            status: args.status.into(),
            last_maintenance_date: args.last_maintenance,
        }
    }
}

async fn departments(api: &ApiClient, cmd: DepartmentCommand) -> Result<()> {
    match cmd {
        DepartmentCommand::List => print_json(&api.get_departments().await?),
        DepartmentCommand::Add(args) => print_json(&api.add_department(&args.into()).await?),
        DepartmentCommand::Update { id, fields } => {
            print_json(&api.update_department(id, &fields.into()).await?)
        }
        DepartmentCommand::Delete { id } => {
            api.delete_department(id).await?;
            println!("Deleted department {}", id);
            Ok(())
        }
    }
}

async fn machines(api: &ApiClient, cmd: MachineCommand) -> Result<()> {
    match cmd {
        MachineCommand::List => print_json(&api.get_machines().await?),
        MachineCommand::Add(args) => print_json(&api.add_machine(&args.into()).await?),
        MachineCommand::Update { id, fields } => {
            print_json(&api.update_machine(id, &fields.into()).await?)
        }
        MachineCommand::Delete { id } => {
            api.delete_machine(id).await?;
            println!("Deleted machine {}", id);
            Ok(())
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use reqwest::Method;
use serde_json::{Value, json};
use storefront::config::{ConfigError, normalize_base_url};
use storefront::guard::{self, Access};
use storefront::notify::NoticeLevel;
use storefront::types::{PasswordChange, ProfileUpdate};
use storefront::{ApiError, ClientConfig, FileStorage, HttpAuthApi, Notice, Registration, SessionError, SessionStore};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("http client setup failed: {0}")]
    Api(#[from] ApiError),
    #[error("no state directory; pass --state-dir or set STOREFRONT_STATE_DIR")]
    MissingStateDir,
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "storefront", about = "Storefront account and API CLI")]
struct Cli {
    #[arg(long, env = "STOREFRONT_BASE_URL")]
    base_url: Option<String>,

    /// Where the session token and user record are kept between runs.
    #[arg(long, env = "STOREFRONT_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and keep the session.
    Login {
        username: String,
        #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log in with it.
    Register(RegisterArgs),
    /// Forget the stored session.
    Logout,
    /// Ask the server who the stored token belongs to.
    Whoami,
    /// Show the stored session without touching the network.
    Status,
    /// Update profile fields.
    Profile(ProfileArgs),
    /// Change the account password.
    Password {
        #[arg(long, hide_env_values = true, env = "STOREFRONT_OLD_PASSWORD")]
        old: String,
        #[arg(long, hide_env_values = true, env = "STOREFRONT_NEW_PASSWORD")]
        new: String,
    },
    /// Send a request to any endpoint with the stored token.
    Api {
        method: String,
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
}

#[derive(Args, Debug)]
struct RegisterArgs {
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    full_name: Option<String>,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    #[arg(long)]
    full_name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    /// Replaces the address list; repeat for several addresses.
    #[arg(long = "address")]
    addresses: Vec<String>,
    #[arg(long)]
    avatar: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(ClientConfig::from_env()?, cli.base_url.as_deref(), cli.state_dir)?;
    let store = open_store(&config)?;
    let mut notices = store.notices();

    let result = run(&store, cli.command).await;
    print_notices(&mut notices);
    result
}

fn resolve_config(
    mut config: ClientConfig,
    base_url: Option<&str>,
    state_dir: Option<PathBuf>,
) -> Result<ClientConfig, CliError> {
    if let Some(raw) = base_url {
        config.base_url = normalize_base_url(raw)?;
    }
    if state_dir.is_some() {
        config.state_dir = state_dir;
    }
    if config.state_dir.is_none() {
        config.state_dir = ProjectDirs::from("", "", "storefront").map(|dirs| dirs.data_dir().to_path_buf());
    }
    Ok(config)
}

fn open_store(config: &ClientConfig) -> Result<SessionStore, CliError> {
    let dir = config.state_dir.clone().ok_or(CliError::MissingStateDir)?;
    let api = HttpAuthApi::new(config)?;
    tracing::debug!(base_url = %api.base_url(), state_dir = %dir.display(), "opening session store");
    Ok(SessionStore::open(Arc::new(api), Arc::new(FileStorage::new(dir))))
}

async fn run(store: &SessionStore, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { username, password } => {
            let identity = store.login(&username, &password).await?;
            print_json(&json!({ "user": identity, "landing": guard::landing_route(&identity) }))
        }
        Command::Register(args) => {
            let mut registration = Registration::new(args.username, args.email, args.password);
            registration.display_name = args.full_name;
            let identity = store.register(&registration).await?;
            print_json(&json!({ "user": identity, "landing": guard::landing_route(&identity) }))
        }
        Command::Logout => {
            store.logout();
            Ok(())
        }
        Command::Whoami => {
            let identity = store.fetch_current_identity().await?;
            print_json(&serde_json::to_value(identity)?)
        }
        Command::Status => print_json(&session_status(store)),
        Command::Profile(args) => {
            let update = ProfileUpdate {
                full_name: args.full_name,
                phone: args.phone,
                addresses: (!args.addresses.is_empty()).then_some(args.addresses),
                avatar: args.avatar,
            };
            let identity = store.update_profile(&update).await?;
            print_json(&serde_json::to_value(identity)?)
        }
        Command::Password { old, new } => {
            let change = PasswordChange { old_password: old, new_password: new, confirm_password: None };
            store.change_password(&change).await?;
            Ok(())
        }
        Command::Api { method, path, data } => {
            let method = parse_method(&method)?;
            let body = parse_data(data.as_deref())?;
            let value = store.call(method, &path, body.as_ref()).await?;
            print_json(&value)
        }
    }
}

fn session_status(store: &SessionStore) -> Value {
    let session = store.session();
    json!({
        "authenticated": session.is_authenticated(),
        "admin": session.is_admin(),
        "pending": session.is_stale(),
        "user": session.identity(),
        "account_route": access_label(guard::require_user(&session)),
        "admin_route": access_label(guard::require_admin(&session)),
    })
}

fn access_label(access: Access) -> String {
    match access {
        Access::Allow => "allow".to_owned(),
        Access::Pending => "pending".to_owned(),
        Access::Redirect(route) => format!("redirect {route}"),
    }
}

fn parse_method(raw: &str) -> Result<Method, CliError> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(raw.to_owned()))
}

fn parse_data(raw: Option<&str>) -> Result<Option<Value>, CliError> {
    raw.map(serde_json::from_str::<Value>).transpose().map_err(CliError::from)
}

fn print_notices(rx: &mut broadcast::Receiver<Notice>) {
    while let Ok(notice) = rx.try_recv() {
        let tag = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Error => "error",
        };
        eprintln!("[{tag}] {}", notice.message);
        for field in &notice.fields {
            eprintln!("  {}: {}", field.field, field.message);
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use truckparts_core::config;
use truckparts_core::error::ApiError;

mod commands;

/// Env var holding the log filter (`tracing_subscriber::EnvFilter` syntax).
const LOG_ENV: &str = "TRUCKPARTS_LOG";

#[derive(Parser)]
#[command(name = "truckparts")]
#[command(version)]
#[command(about = "TruckParts account and session client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        /// Phone number to sign in with
        #[arg(long, conflicts_with = "username", required_unless_present = "username")]
        phone: Option<String>,

        /// Username to sign in with
        #[arg(long)]
        username: Option<String>,

        /// Password (read from stdin when omitted)
        #[arg(long, env = "TRUCKPARTS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// End the session on the server and locally
    Logout {
        /// Revoke every session of this account, not just this one
        #[arg(long)]
        all: bool,
    },

    /// Show the stored session state
    Status,

    /// Show the signed-in user
    Whoami,

    /// Exchange the stored refresh token for a new access token
    Refresh,

    /// Send an API request with the stored session
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        #[arg(value_name = "METHOD")]
        method: String,

        /// Path below the API prefix, e.g. /products/
        #[arg(value_name = "PATH")]
        path: String,

        /// JSON request body
        #[arg(long, value_name = "JSON")]
        data: Option<String>,

        /// Query parameter, repeatable
        #[arg(long = "query", short = 'q', value_name = "KEY=VALUE")]
        query: Vec<String>,

        /// Send without the bearer token
        #[arg(long)]
        no_auth: bool,
    },

    /// View or edit the signed-in user's profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Change or reset a password
    Password {
        #[command(subcommand)]
        command: PasswordCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ProfileCommands {
    /// Print the profile as JSON
    Show,
    /// Update profile fields
    Update {
        /// Field to change, repeatable
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        fields: Vec<String>,
    },
}

#[derive(clap::Subcommand)]
enum PasswordCommands {
    /// Change the password of the signed-in user (passwords read from stdin)
    Change,
    /// Request a password reset email
    Reset {
        /// Account email
        #[arg(value_name = "EMAIL")]
        email: String,
    },
    /// Set a new password with a reset token (password read from stdin)
    Confirm {
        /// Token from the reset email
        #[arg(value_name = "TOKEN")]
        token: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    let result = rt.block_on(async move { dispatch(cli).await });
    if let Err(e) = &result
        && let Some(hint) = session_hint(e)
    {
        eprintln!("{hint}");
    }
    result
}

/// The gateway's login redirect is delayed and dies with the runtime, so an
/// ended session is announced from the command's error instead.
fn session_hint(error: &anyhow::Error) -> Option<&'static str> {
    error
        .downcast_ref::<ApiError>()
        .filter(|e| e.is_session_expired())
        .map(|_| "Session ended. Run `truckparts login` to sign in again.")
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        // config commands must work with a broken config file
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
        command => {
            let config = config::Config::load().context("load config")?;
            dispatch_with_config(command, &config).await
        }
    }
}

async fn dispatch_with_config(command: Commands, config: &config::Config) -> Result<()> {
    match command {
        Commands::Login {
            phone,
            username,
            password,
        } => commands::auth::login(config, phone, username, password).await,
        Commands::Logout { all } => commands::auth::logout(config, all).await,
        Commands::Status => commands::auth::status(),
        Commands::Whoami => commands::auth::whoami(config).await,
        Commands::Refresh => commands::auth::refresh(config).await,
        Commands::Request {
            method,
            path,
            data,
            query,
            no_auth,
        } => commands::request::run(config, &method, &path, data.as_deref(), &query, no_auth).await,
        Commands::Profile { command } => match command {
            ProfileCommands::Show => commands::profile::show(config).await,
            ProfileCommands::Update { fields } => commands::profile::update(config, &fields).await,
        },
        Commands::Password { command } => match command {
            PasswordCommands::Change => commands::password::change(config).await,
            PasswordCommands::Reset { email } => commands::password::reset(config, &email).await,
            PasswordCommands::Confirm { token } => commands::password::confirm(config, &token).await,
        },
        Commands::Config { .. } => unreachable!("handled before loading config"),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use truckparts_core::error::ApiErrorKind;

    use super::*;

    #[test]
    fn test_session_hint_only_for_expired_sessions() {
        let expired = ApiError::from_response(401, None).into_session_expired();
        assert!(session_hint(&anyhow::Error::new(expired)).is_some_and(|h| h.contains("truckparts login")));

        let forbidden = ApiError::from_response(403, None);
        assert_ne!(forbidden.kind, ApiErrorKind::SessionExpired);
        assert!(session_hint(&anyhow::Error::new(forbidden)).is_none());
        assert!(session_hint(&anyhow!("Not logged in")).is_none());
    }
}

//! Matricula CLI - enrollment console session and permission tools.
//!
//! # Usage
//!
//! ```bash
//! # Sign in with username or email (password from MATRICULA_PASSWORD)
//! matricula login password -u ana@uni.edu
//!
//! # Sign in with a second factor
//! matricula login password -u ana@uni.edu --mfa-code 042917
//!
//! # Sign in with a Google ID token
//! matricula login google --id-token "$GOOGLE_ID_TOKEN"
//!
//! # Who am I, and may I delete courses?
//! matricula whoami
//! matricula can cursos DELETE
//!
//! # Role administration
//! matricula roles list
//! matricula roles set 2 cursos:UPDATE --revoke
//! matricula matrix 2
//!
//! # Sign out
//! matricula logout
//! ```
//!
//! # Environment Variables
//!
//! See `matricula_console::config` for the console settings. In addition:
//!
//! - `MATRICULA_PASSWORD` - Password for `login password` when `--password` is omitted
//! - `MATRICULA_LOG_JSON` - Emit JSON logs instead of text
//! - `RUST_LOG` - Log filter (default: `matricula_console=info,matricula_cli=info`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use clap::{Parser, Subcommand};
use matricula_console::config::ConsoleConfig;
use matricula_console::provider::{IdentityProvider, StaticIdTokenProvider};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "matricula")]
#[command(author, version, about = "Matricula enrollment console")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in
    Login {
        #[command(subcommand)]
        method: LoginMethod,
    },
    /// Sign out and remove the saved session
    Logout,
    /// Show the signed-in user and their roles
    Whoami,
    /// Check whether the signed-in user may perform an operation
    Can {
        /// Resource name (e.g. `cursos`)
        resource: String,
        /// Operation name (`CREATE`, `READ`, `UPDATE`, `DELETE`)
        operation: String,
    },
    /// Manage roles
    Roles {
        #[command(subcommand)]
        action: RolesAction,
    },
    /// List the permission catalog
    Permissions,
    /// Show a role's permission matrix
    Matrix {
        /// Role ID
        role_id: i64,
    },
}

#[derive(Subcommand)]
enum LoginMethod {
    /// Username (or email) and password
    Password {
        /// Username or email
        #[arg(short, long)]
        username: String,

        /// Password (defaults to `MATRICULA_PASSWORD`)
        #[arg(short, long)]
        password: Option<String>,

        /// Second-factor code, if the account requires one
        #[arg(long)]
        mfa_code: Option<String>,
    },
    /// Google ID token
    Google {
        /// ID token issued by Google
        #[arg(long)]
        id_token: String,

        /// Display name reported by Google
        #[arg(long)]
        name: Option<String>,

        /// Profile picture URL reported by Google
        #[arg(long)]
        photo_url: Option<String>,

        /// Second-factor code, if the account requires one
        #[arg(long)]
        mfa_code: Option<String>,
    },
}

#[derive(Subcommand)]
enum RolesAction {
    /// List roles and their permissions
    List,
    /// Grant a permission to a role by ID
    Grant { role_id: i64, permission_id: i64 },
    /// Revoke a permission from a role by ID
    Revoke { role_id: i64, permission_id: i64 },
    /// Grant or revoke a permission by name (e.g. `cursos:UPDATE`)
    Set {
        role_id: i64,
        permission: String,

        /// Revoke instead of grant
        #[arg(long)]
        revoke: bool,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ConsoleConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "matricula_console=info,matricula_cli=info".into());

    let json = std::env::var("MATRICULA_LOG_JSON").is_ok();
    // Logs go to stderr; stdout carries command output
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    // Both reqwest stacks link rustls; pick the provider before any TLS use
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let config = ConsoleConfig::from_env();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(CliError::from(e)),
    };

    if let Err(e) = result {
        tracing::error!("{}", e.notification());
        tracing::debug!("Command failed: {e}");
        std::process::exit(e.exit_code());
    }
}

/// The identity provider a command needs, if any.
fn provider_for(command: &Commands) -> Option<Arc<dyn IdentityProvider>> {
    match command {
        Commands::Login {
            method:
                LoginMethod::Google {
                    id_token,
                    name,
                    photo_url,
                    ..
                },
        } => Some(Arc::new(
            StaticIdTokenProvider::new(id_token.clone())
                .with_profile(name.clone(), photo_url.clone()),
        )),
        _ => None,
    }
}

async fn run(cli: Cli, config: &ConsoleConfig) -> Result<(), CliError> {
    let console = commands::open(config, provider_for(&cli.command)).await?;

    match cli.command {
        Commands::Login { method } => match method {
            LoginMethod::Password {
                username,
                password,
                mfa_code,
            } => {
                commands::session::login_password(
                    &console,
                    &username,
                    password,
                    mfa_code.as_deref(),
                )
                .await?;
            }
            LoginMethod::Google { mfa_code, .. } => {
                commands::session::login_google(&console, mfa_code.as_deref()).await?;
            }
        },
        Commands::Logout => commands::session::logout(&console).await,
        Commands::Whoami => commands::session::whoami(&console)?,
        Commands::Can {
            resource,
            operation,
        } => commands::access::can(&console, &resource, &operation)?,
        Commands::Roles { action } => match action {
            RolesAction::List => commands::roles::list(&console).await?,
            RolesAction::Grant {
                role_id,
                permission_id,
            } => commands::roles::grant(&console, role_id, permission_id).await?,
            RolesAction::Revoke {
                role_id,
                permission_id,
            } => commands::roles::revoke(&console, role_id, permission_id).await?,
            RolesAction::Set {
                role_id,
                permission,
                revoke,
            } => commands::roles::set(&console, role_id, &permission, !revoke).await?,
        },
        Commands::Permissions => commands::roles::catalog(&console).await?,
        Commands::Matrix { role_id } => commands::access::matrix(&console, role_id).await?,
    }
    Ok(())
}

//! CLI command implementations.

pub mod access;
pub mod roles;
pub mod session;

use std::sync::Arc;

use matricula_console::config::{ConfigError, ConsoleConfig};
use matricula_console::provider::IdentityProvider;
use matricula_console::{Console, ConsoleError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Console(#[from] ConsoleError),

    /// No password on the command line or in the environment.
    #[error("Missing password: pass --password or set MATRICULA_PASSWORD")]
    MissingPassword,

    /// The account needs a second factor and none was given.
    #[error("This account requires a second factor: pass --mfa-code")]
    SecondFactorRequired,

    /// The second-factor code was not accepted.
    #[error("Second-factor code rejected")]
    SecondFactorRejected,

    /// A command argument is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The permission check answered no.
    #[error("Permission denied")]
    Denied,
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Console(err.into())
    }
}

impl CliError {
    /// Message shown to the user.
    pub fn notification(&self) -> String {
        match self {
            Self::Console(e) => e.notification(),
            other => other.to_string(),
        }
    }

    /// Process exit code: 1 for a denied check, 2 for anything else.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Denied => 1,
            _ => 2,
        }
    }
}

/// Write one line of command output to stdout.
///
/// Results go here rather than through `tracing`, so the log filter and
/// format never hide or reshape them.
#[allow(clippy::print_stdout)]
pub fn emit(line: impl std::fmt::Display) {
    println!("{line}");
}

/// Build the console, restore the saved session and load its permissions.
///
/// A saved credential the backend refuses is signed out and the command
/// continues unauthenticated.
pub async fn open(
    config: &ConsoleConfig,
    provider: Option<Arc<dyn IdentityProvider>>,
) -> Result<Console, CliError> {
    let console = Console::new(config, provider)?;
    match console.start().await {
        Ok(_) | Err(ConsoleError::Refresh(_)) => Ok(console),
        Err(e) => Err(e.into()),
    }
}

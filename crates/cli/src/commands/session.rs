//! Sign-in and sign-out commands.
//!
//! # Usage
//!
//! ```bash
//! matricula login password -u ana@uni.edu --mfa-code 042917
//! matricula login google --id-token "$GOOGLE_ID_TOKEN" --name "Ana Pérez"
//! matricula whoami
//! matricula logout
//! ```

use matricula_console::Console;
use matricula_console::session::LoginOutcome;
use secrecy::SecretString;

use matricula_core::Identity;

use super::{CliError, emit};

/// Sign in with a username (or email) and password.
pub async fn login_password(
    console: &Console,
    username: &str,
    password: Option<String>,
    mfa_code: Option<&str>,
) -> Result<(), CliError> {
    let password = password
        .or_else(|| std::env::var("MATRICULA_PASSWORD").ok())
        .map(SecretString::from)
        .ok_or(CliError::MissingPassword)?;

    let outcome = console.login_with_password(username, &password).await?;
    finish_login(console, outcome, mfa_code).await
}

/// Sign in with the identity provider attached to `console`.
pub async fn login_google(console: &Console, mfa_code: Option<&str>) -> Result<(), CliError> {
    let outcome = console.login_with_federated_identity().await?;
    finish_login(console, outcome, mfa_code).await
}

async fn finish_login(
    console: &Console,
    outcome: LoginOutcome,
    mfa_code: Option<&str>,
) -> Result<(), CliError> {
    if outcome == LoginOutcome::SecondFactorRequired {
        let code = mfa_code.ok_or(CliError::SecondFactorRequired)?;
        if !console.verify_second_factor(code).await? {
            return Err(CliError::SecondFactorRejected);
        }
    }

    whoami(console)
}

/// Sign out.
pub async fn logout(console: &Console) {
    console.logout().await;
}

/// Show the signed-in user.
pub fn whoami(console: &Console) -> Result<(), CliError> {
    let identity = console
        .session()
        .identity()
        .ok_or(matricula_console::ConsoleError::NotAuthenticated)?;

    emit(identity_line(&identity));
    Ok(())
}

fn identity_line(identity: &Identity) -> String {
    let roles: Vec<&str> = identity.roles.iter().map(String::as_str).collect();
    format!(
        "Signed in as {} <{}> (roles: {})",
        identity.display_name,
        identity.email,
        if roles.is_empty() {
            "none".to_owned()
        } else {
            roles.join(", ")
        }
    )
}

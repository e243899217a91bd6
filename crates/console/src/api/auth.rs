//! Auth-service exchanges.
//!
//! Federated ID tokens and username/password pairs are exchanged for the
//! backend's own bearer token; second-factor codes are checked against the
//! pending bearer token.

use matricula_core::{Credential, SecondFactorCode};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::client::{ApiClient, check_status, decode_json};
use super::ApiError;

const GOOGLE_LOGIN_PATH: &str = "/google/login";
const PASSWORD_LOGIN_PATH: &str = "/login";
const SECOND_FACTOR_PATH: &str = "/mfa/verify";

/// Request body for the federated login exchange.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleLoginRequest<'a> {
    id_token: &'a str,
}

/// Request body for the username/password login.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordLoginRequest<'a> {
    username_or_email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SecondFactorRequest<'a> {
    code: &'a str,
}

/// Wire shape of a successful login.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponseBody {
    token: String,
    #[serde(rename = "type", default)]
    token_type: Option<String>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    mfa_required: bool,
}

/// Result of a successful login exchange.
#[derive(Debug, Clone)]
pub struct LoginResponse {
    /// Bearer token for subsequent calls.
    pub credential: Credential,
    /// Token scheme reported by the backend (normally `Bearer`).
    pub token_type: Option<String>,
    pub username: String,
    /// Email, when the account has one.
    pub email: Option<String>,
    /// Role names granted to the account.
    pub roles: Vec<String>,
    /// Whether a second factor must be verified before the session is usable.
    pub mfa_required: bool,
}

impl From<LoginResponseBody> for LoginResponse {
    fn from(body: LoginResponseBody) -> Self {
        Self {
            credential: Credential::new(body.token),
            token_type: body.token_type,
            username: body.username,
            email: body.email.filter(|email| !email.is_empty()),
            roles: body.roles,
            mfa_required: body.mfa_required,
        }
    }
}

impl ApiClient {
    /// Exchange a federated identity-provider token for a backend session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` or `ApiError::Status` if the backend
    /// rejects the token, `ApiError::InvalidResponse` if the success body has
    /// no usable token and `ApiError::Http` on transport failures.
    #[instrument(skip_all)]
    pub async fn exchange_federated_token(
        &self,
        id_token: &SecretString,
    ) -> Result<LoginResponse, ApiError> {
        let body = GoogleLoginRequest {
            id_token: id_token.expose_secret(),
        };
        self.login(GOOGLE_LOGIN_PATH, &body).await
    }

    /// Exchange a username (or email) and password for a backend session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` or `ApiError::Status` if the backend
    /// rejects the credentials, `ApiError::Http` on transport failures.
    #[instrument(skip(self, password), fields(identifier = %identifier))]
    pub async fn exchange_password(
        &self,
        identifier: &str,
        password: &SecretString,
    ) -> Result<LoginResponse, ApiError> {
        let body = PasswordLoginRequest {
            username_or_email: identifier,
            password: password.expose_secret(),
        };
        self.login(PASSWORD_LOGIN_PATH, &body).await
    }

    /// Ask the auth service whether `code` is the current second factor for
    /// the session identified by `credential`.
    ///
    /// Returns `Ok(false)` when the service rejects the code (400, 401 or
    /// 403).
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` on transport failures and `ApiError::Status`
    /// or `ApiError::RateLimited` for other non-success statuses.
    #[instrument(skip_all)]
    pub async fn verify_second_factor(
        &self,
        credential: &Credential,
        code: &SecondFactorCode,
    ) -> Result<bool, ApiError> {
        let response = self
            .http()
            .post(self.auth_url(SECOND_FACTOR_PATH))
            .bearer_auth(credential.expose())
            .json(&SecondFactorRequest {
                code: code.as_str(),
            })
            .send()
            .await?;

        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Ok(false)
            }
            _ => check_status(response).await.map(|_| true),
        }
    }

    async fn login<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<LoginResponse, ApiError> {
        let response = self
            .http()
            .post(self.auth_url(path))
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: LoginResponseBody = decode_json(response).await?;
        Ok(body.into())
    }
}

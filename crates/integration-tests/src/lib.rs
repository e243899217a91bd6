//! Integration tests for the Matricula console.
//!
//! Every test runs the console against an [`httpmock`] server standing in for
//! both the auth service and the resource API, with the session persisted in
//! a temporary directory.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p matricula-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_lifecycle` - login, restore, second factor, logout
//! - `permission_resolution` - backend/fallback precedence and refresh ordering
//! - `role_admin` - permission matrix edits

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use matricula_console::Console;
use matricula_console::api::ApiClient;
use matricula_console::config::ApiConfig;
use matricula_console::session::SessionStore;
use matricula_console::storage::FileStorage;
use matricula_core::{AuthenticatedSession, Credential, Identity};
use serde_json::{Value, json};
use tempfile::TempDir;

/// A mock backend plus a session directory.
pub struct TestContext {
    pub server: MockServer,
    pub session_dir: TempDir,
}

impl TestContext {
    /// Start a mock backend and create an empty session directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[allow(clippy::expect_used)]
    pub async fn new() -> Self {
        Self {
            server: MockServer::start_async().await,
            session_dir: tempfile::tempdir().expect("Failed to create session directory"),
        }
    }

    /// Client configuration pointing at the mock backend.
    ///
    /// # Panics
    ///
    /// Panics if the mock server URL does not parse.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            auth_base_url: self
                .server
                .url("/api/auth")
                .parse()
                .expect("mock auth URL"),
            api_base_url: self.server.url("/api").parse().expect("mock API URL"),
            timeout: Duration::from_secs(5),
        }
    }

    /// Client for the mock backend.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn api(&self) -> ApiClient {
        ApiClient::new(&self.api_config()).expect("Failed to build API client")
    }

    /// Session store persisting into this context's directory.
    #[must_use]
    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(
            self.api(),
            Arc::new(FileStorage::new(self.session_dir.path())),
        )
    }

    /// A console over [`session_store`](Self::session_store).
    #[must_use]
    pub fn console(&self) -> Console {
        Console::from_parts(self.api(), self.session_store())
    }

    /// Answer password logins for `username` with `token` and `roles`.
    pub async fn mock_password_login(&self, username: &str, token: &str, roles: &[&str]) {
        let username = username.to_owned();
        let body = login_body(&username, token, roles);
        self.server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/auth/login")
                    .json_body(json!({"usernameOrEmail": username, "password": "secret"}));
                then.status(200).json_body(body);
            })
            .await;
    }

    /// Answer `GET /auth/roles` for `token` with `roles`, after `delay`.
    pub async fn mock_roles(&self, token: &str, roles: Value, delay: Duration) {
        let authorization = format!("Bearer {token}");
        self.server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/auth/roles")
                    .header("authorization", authorization);
                then.status(200).json_body(roles).delay(delay);
            })
            .await;
    }
}

/// Login response as the auth service sends it.
#[must_use]
pub fn login_body(username: &str, token: &str, roles: &[&str]) -> Value {
    json!({
        "token": token,
        "type": "Bearer",
        "username": username,
        "email": format!("{username}@uni.edu"),
        "roles": roles,
    })
}

/// A session for `token` carrying `roles`.
#[must_use]
pub fn session(token: &str, roles: &[&str]) -> AuthenticatedSession {
    AuthenticatedSession::new(
        Identity {
            id: format!("{token}@uni.edu"),
            email: format!("{token}@uni.edu"),
            display_name: token.to_owned(),
            avatar_url: None,
            roles: roles.iter().map(|role| (*role).to_owned()).collect(),
        },
        Credential::new(token),
    )
}

//! Session store.
//!
//! [`SessionStore`] owns the signed-in identity and its bearer credential.
//! It is created once at start-up, initialised with
//! [`restore_session`](SessionStore::restore_session) and torn down with
//! [`logout`](SessionStore::logout).
//!
//! # Lifecycle
//!
//! ```text
//! Loading ──restore──▶ Unauthenticated ──login──▶ Authenticated
//!                            │                        ▲
//!                            └──login (2FA)──▶ PendingSecondFactor ──verify──┘
//! ```
//!
//! A failed login or verification leaves the previous state in place.
//! Restore, login, verify and logout are serialized: a logout never
//! interleaves with a login that is still waiting on the network.

mod error;
mod verifier;

pub use error::SessionError;
pub use verifier::{BackendVerifier, SecondFactorVerifier};

use std::sync::Arc;

use matricula_core::{AuthenticatedSession, Credential, Identity, SecondFactorCode};
use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiClient, LoginResponse};
use crate::provider::{FederatedToken, IdentityProvider, NoProvider};
use crate::storage::{SessionStorage, StorageError, TOKEN_KEY, USER_KEY};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Persisted session not read yet.
    Loading,
    Unauthenticated,
    /// A login is waiting for its second factor. A previous session, if any,
    /// stays current until the code is verified.
    PendingSecondFactor,
    Authenticated,
}

/// What observers of the session see.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session: Option<AuthenticatedSession>,
}

impl SessionSnapshot {
    /// The current identity, if signed in.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }
}

/// Result of a login attempt that was not rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The session is current and persisted.
    Authenticated(Identity),
    /// A second-factor code must be verified first.
    SecondFactorRequired,
}

/// Owner of the signed-in session.
pub struct SessionStore {
    api: ApiClient,
    storage: Arc<dyn SessionStorage>,
    provider: Arc<dyn IdentityProvider>,
    verifier: Arc<dyn SecondFactorVerifier>,
    require_second_factor: bool,
    /// Serializes lifecycle operations and holds the login awaiting its
    /// second factor.
    pending: Mutex<Option<AuthenticatedSession>>,
    current: watch::Sender<SessionSnapshot>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.state())
            .field("require_second_factor", &self.require_second_factor)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create a store in the [`SessionState::Loading`] state.
    ///
    /// Federated sign-in is unavailable until a provider is attached with
    /// [`with_provider`](Self::with_provider). Second factors are checked by
    /// the auth service unless another verifier is attached.
    #[must_use]
    pub fn new(api: ApiClient, storage: Arc<dyn SessionStorage>) -> Self {
        let verifier = Arc::new(BackendVerifier::new(api.clone()));
        Self {
            api,
            storage,
            provider: Arc::new(NoProvider),
            verifier,
            require_second_factor: false,
            pending: Mutex::new(None),
            current: watch::Sender::new(SessionSnapshot {
                state: SessionState::Loading,
                session: None,
            }),
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SecondFactorVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Hold every login until a second factor is verified, whatever the
    /// login response says.
    #[must_use]
    pub const fn require_second_factor(mut self, required: bool) -> Self {
        self.require_second_factor = required;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.current.borrow().state
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().session.is_some()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.current.borrow().identity().cloned()
    }

    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.current
            .borrow()
            .session
            .as_ref()
            .map(|s| s.credential.clone())
    }

    #[must_use]
    pub fn current(&self) -> Option<AuthenticatedSession> {
        self.current.borrow().session.clone()
    }

    /// Whether the current identity carries `role`. False when signed out.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.current
            .borrow()
            .identity()
            .is_some_and(|identity| identity.has_role(role))
    }

    /// Watch the session. The receiver sees every state and identity change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.current.subscribe()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load the persisted session, if any.
    ///
    /// Both the identity and the token must be present; a lone entry is
    /// discarded. Nothing is checked against the backend. Returns whether a
    /// session was restored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if storage cannot be read.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> Result<bool, SessionError> {
        let _lifecycle = self.pending.lock().await;

        let stored = self.read_stored().await;
        let (user, token) = match stored {
            Ok(entries) => entries,
            Err(e) => {
                self.leave_loading();
                return Err(e.into());
            }
        };

        match (user, token) {
            (Some(user), Some(token)) => match serde_json::from_str::<Identity>(&user) {
                Ok(identity) => {
                    info!(user = %identity.id, "Session restored");
                    self.publish(
                        SessionState::Authenticated,
                        Some(AuthenticatedSession::new(identity, Credential::new(token))),
                    );
                    Ok(true)
                }
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable persisted identity");
                    self.clear_storage().await;
                    self.publish(SessionState::Unauthenticated, None);
                    Ok(false)
                }
            },
            (None, None) => {
                debug!("No persisted session");
                self.publish(SessionState::Unauthenticated, None);
                Ok(false)
            }
            _ => {
                warn!("Discarding incomplete persisted session");
                self.clear_storage().await;
                self.publish(SessionState::Unauthenticated, None);
                Ok(false)
            }
        }
    }

    /// Sign in through the identity provider.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Authentication` if the provider flow fails or is
    /// cancelled or the auth service rejects the token,
    /// `SessionError::Network` if the auth service is unreachable and
    /// `SessionError::Storage` if the session cannot be persisted.
    #[instrument(skip(self))]
    pub async fn login_with_federated_identity(&self) -> Result<LoginOutcome, SessionError> {
        let mut pending = self.pending.lock().await;

        let token = self.provider.sign_in().await?;
        let response = self.api.exchange_federated_token(&token.id_token).await?;
        let mfa_required = response.mfa_required;
        let session = federated_session(response, &token);

        self.complete_login(&mut pending, session, mfa_required)
            .await
    }

    /// Sign in with a username (or email) and password.
    ///
    /// # Errors
    ///
    /// Same as [`login_with_federated_identity`](Self::login_with_federated_identity),
    /// minus the provider.
    #[instrument(skip(self, password))]
    pub async fn login_with_password(
        &self,
        identifier: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, SessionError> {
        let mut pending = self.pending.lock().await;

        let response = self.api.exchange_password(identifier, password).await?;
        let mfa_required = response.mfa_required;
        let session = password_session(response);

        self.complete_login(&mut pending, session, mfa_required)
            .await
    }

    /// Submit the second-factor code for the pending login.
    ///
    /// Anything other than six ASCII digits is rejected without asking the
    /// verifier. On success the pending login becomes the current session,
    /// exactly as a direct login would.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoPendingChallenge` if no login is waiting,
    /// `SessionError::Network` if the verifier cannot be reached and
    /// `SessionError::Storage` if the session cannot be persisted.
    #[instrument(skip_all)]
    pub async fn verify_second_factor(&self, code: &str) -> Result<bool, SessionError> {
        let mut pending = self.pending.lock().await;

        let Some(session) = pending.as_ref() else {
            return Err(SessionError::NoPendingChallenge);
        };

        let code = match SecondFactorCode::parse(code) {
            Ok(code) => code,
            Err(e) => {
                debug!(error = %e, "Rejecting malformed second-factor code");
                return Ok(false);
            }
        };

        if !self.verifier.verify(&session.credential, &code).await? {
            info!(user = %session.identity.id, "Second-factor code rejected");
            return Ok(false);
        }

        let Some(session) = pending.take() else {
            return Err(SessionError::NoPendingChallenge);
        };
        if let Err(e) = self.persist(&session).await {
            *pending = Some(session);
            return Err(e);
        }

        info!(user = %session.identity.id, "Second factor verified");
        self.publish(SessionState::Authenticated, Some(session));
        Ok(true)
    }

    /// Sign out.
    ///
    /// Ends the provider session (best effort), forgets any pending login,
    /// clears the current session and removes it from storage. Failures are
    /// logged, never returned.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let mut pending = self.pending.lock().await;

        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "Identity provider sign-out failed");
        }

        *pending = None;
        self.clear_storage().await;

        let previous = self.current.borrow().identity().map(|i| i.id.clone());
        self.publish(SessionState::Unauthenticated, None);
        info!(user = previous.as_deref().unwrap_or("-"), "Signed out");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn complete_login(
        &self,
        pending: &mut Option<AuthenticatedSession>,
        session: AuthenticatedSession,
        mfa_required: bool,
    ) -> Result<LoginOutcome, SessionError> {
        if mfa_required || self.require_second_factor {
            info!(user = %session.identity.id, "Login awaiting second factor");
            *pending = Some(session);
            self.current
                .send_modify(|snapshot| snapshot.state = SessionState::PendingSecondFactor);
            return Ok(LoginOutcome::SecondFactorRequired);
        }

        self.persist(&session).await?;
        *pending = None;

        let identity = session.identity.clone();
        info!(user = %identity.id, roles = ?identity.roles, "Signed in");
        self.publish(SessionState::Authenticated, Some(session));
        Ok(LoginOutcome::Authenticated(identity))
    }

    /// Write identity then token. If the token cannot be written the
    /// identity entry is removed again.
    async fn persist(&self, session: &AuthenticatedSession) -> Result<(), SessionError> {
        let user = serde_json::to_string(&session.identity).map_err(StorageError::from)?;
        self.storage.set(USER_KEY, &user).await?;

        if let Err(e) = self.storage.set(TOKEN_KEY, session.credential.expose()).await {
            if let Err(cleanup) = self.storage.remove(USER_KEY).await {
                warn!(error = %cleanup, "Could not remove identity after failed token write");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_stored(&self) -> Result<(Option<String>, Option<String>), StorageError> {
        let user = self.storage.get(USER_KEY).await?;
        let token = self.storage.get(TOKEN_KEY).await?;
        Ok((user, token))
    }

    async fn clear_storage(&self) {
        for key in [USER_KEY, TOKEN_KEY] {
            if let Err(e) = self.storage.remove(key).await {
                warn!(key, error = %e, "Could not remove persisted session entry");
            }
        }
    }

    fn publish(&self, state: SessionState, session: Option<AuthenticatedSession>) {
        self.current.send_replace(SessionSnapshot { state, session });
    }

    fn leave_loading(&self) {
        self.current.send_if_modified(|snapshot| {
            if snapshot.state == SessionState::Loading {
                snapshot.state = SessionState::Unauthenticated;
                true
            } else {
                false
            }
        });
    }
}

/// Identity for a federated login: the provider supplies the display name
/// and avatar when it has them.
fn federated_session(response: LoginResponse, token: &FederatedToken) -> AuthenticatedSession {
    let email = response
        .email
        .clone()
        .unwrap_or_else(|| response.username.clone());
    let identity = Identity {
        id: email.clone(),
        email,
        display_name: token
            .display_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| response.username.clone()),
        avatar_url: token.photo_url.clone(),
        roles: response.roles.into_iter().collect(),
    };
    AuthenticatedSession::new(identity, response.credential)
}

fn password_session(response: LoginResponse) -> AuthenticatedSession {
    let email = response
        .email
        .unwrap_or_else(|| response.username.clone());
    let identity = Identity {
        id: email.clone(),
        email,
        display_name: response.username,
        avatar_url: None,
        roles: response.roles.into_iter().collect(),
    };
    AuthenticatedSession::new(identity, response.credential)
}

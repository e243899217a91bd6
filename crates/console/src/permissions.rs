//! Permission resolver.
//!
//! Answers "may the current user perform `operation` on `resource`?" for
//! rendering decisions. The backend stays the authority; this only decides
//! which actions the console offers.
//!
//! The backend's role table is fetched on every identity change and swapped
//! in whole. Roles the backend does not describe are answered from the
//! built-in fallback table (see [`matricula_core::resolve`]).
//!
//! # Ordering
//!
//! Each refresh takes a generation number when it is issued. Its result is
//! committed only if no refresh was issued after it, so when responses
//! arrive out of order the last-issued refresh wins.
//!
//! A resolver bound to a session store with
//! [`with_sessions`](PermissionResolver::with_sessions) also refuses a
//! refresh for a session that is no longer the store's current one, both
//! when it is issued and again when its result would be committed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use matricula_core::{
    AuthenticatedSession, Operation, Resource, RolePermissionMap, resolve, static_fallback,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiClient, ApiError};
use crate::session::SessionSnapshot;

/// Errors a refresh reports to its caller.
///
/// Every other failure is logged and the previous grants are kept.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The backend rejected the session's credential (401).
    #[error("Permission refresh rejected the session: {0}")]
    Authentication(String),
}

/// What a refresh did to the grant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetched roles replaced the table.
    Applied,
    /// A later refresh was issued meanwhile; the result was discarded.
    Superseded,
    /// Signed out: roles and table were emptied.
    Cleared,
    /// The fetch failed; the previous table is still in use.
    KeptStale,
}

/// A refresh that has been issued but not committed.
#[derive(Debug, Clone, Copy)]
struct Ticket(u64);

/// Shared permission state for the current session.
pub struct PermissionResolver {
    api: ApiClient,
    roles: ArcSwap<Vec<String>>,
    map: ArcSwap<RolePermissionMap>,
    generation: AtomicU64,
    /// Makes "check generation, then store" atomic with respect to issuing.
    commit: Mutex<()>,
    /// The session store's snapshots, when bound to one.
    sessions: Option<watch::Receiver<SessionSnapshot>>,
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("roles", &self.roles.load())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl PermissionResolver {
    /// A resolver with no roles and an empty backend table.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            roles: ArcSwap::from_pointee(Vec::new()),
            map: ArcSwap::from_pointee(RolePermissionMap::new()),
            generation: AtomicU64::new(0),
            commit: Mutex::new(()),
            sessions: None,
        }
    }

    /// Only accept refreshes for the session `sessions` currently holds.
    ///
    /// A refresh for any other session (including `None` while signed in)
    /// returns [`RefreshOutcome::Superseded`] and leaves roles and table
    /// untouched.
    #[must_use]
    pub fn with_sessions(mut self, sessions: watch::Receiver<SessionSnapshot>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Role names currently checked.
    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        self.roles.load().as_ref().clone()
    }

    /// The backend grant table currently in use.
    #[must_use]
    pub fn backend_map(&self) -> Arc<RolePermissionMap> {
        self.map.load_full()
    }

    /// Whether any current role may perform `operation` on `resource`.
    #[must_use]
    pub fn has_permission(&self, resource: Resource, operation: Operation) -> bool {
        let roles = self.roles.load();
        let map = self.map.load();
        resolve(
            &map,
            static_fallback(),
            roles.iter().map(String::as_str),
            resource,
            operation,
        )
    }

    /// [`has_permission`](Self::has_permission) for wire names such as
    /// `("cursos", "READ")`. Unknown names are denied.
    #[must_use]
    pub fn has_permission_named(&self, resource: &str, operation: &str) -> bool {
        match (resource.parse(), operation.parse()) {
            (Ok(resource), Ok(operation)) => self.has_permission(resource, operation),
            _ => {
                debug!(resource, operation, "Denying unknown permission name");
                false
            }
        }
    }

    /// Rebuild the grant table for `session`, or clear it for `None`.
    ///
    /// # Errors
    ///
    /// Returns `RefreshError::Authentication` if the backend rejects the
    /// session's credential. The table is left as it was.
    #[instrument(skip_all, fields(user = session.map(|s| s.identity.id.as_str())))]
    pub async fn refresh(
        &self,
        session: Option<&AuthenticatedSession>,
    ) -> Result<RefreshOutcome, RefreshError> {
        let Some(ticket) = self.issue(session) else {
            debug!("Refresh requested for a session that is no longer current");
            return Ok(RefreshOutcome::Superseded);
        };
        match session {
            Some(session) => self.fetch_and_commit(ticket, session).await,
            None => Ok(RefreshOutcome::Cleared),
        }
    }

    /// Refresh on every session change until the session store goes away.
    pub fn follow(self: Arc<Self>, sessions: watch::Receiver<SessionSnapshot>) -> JoinHandle<()> {
        self.follow_with(sessions, |_| {})
    }

    /// Like [`follow`](Self::follow), calling `on_rejected` with the session
    /// whose credential the backend refused.
    ///
    /// Each change is issued in order and fetched on its own task, so a slow
    /// response never holds back a newer one.
    pub fn follow_with<F>(
        self: Arc<Self>,
        mut sessions: watch::Receiver<SessionSnapshot>,
        on_rejected: F,
    ) -> JoinHandle<()>
    where
        F: Fn(AuthenticatedSession) + Send + Sync + 'static,
    {
        let on_rejected = Arc::new(on_rejected);
        tokio::spawn(async move {
            let mut last: Option<AuthenticatedSession> = None;
            loop {
                let current = sessions.borrow_and_update().session.clone();
                if !same_session(last.as_ref(), current.as_ref()) {
                    let ticket = self.issue(current.as_ref());
                    if let (Some(ticket), Some(session)) = (ticket, current.clone()) {
                        let resolver = Arc::clone(&self);
                        let on_rejected = Arc::clone(&on_rejected);
                        tokio::spawn(async move {
                            let result = resolver.fetch_and_commit(ticket, &session).await;
                            if let Err(RefreshError::Authentication(_)) = result {
                                (*on_rejected)(session);
                            }
                        });
                    }
                    last = current;
                }

                if sessions.changed().await.is_err() {
                    debug!("Session store dropped; no longer following");
                    break;
                }
            }
        })
    }

    /// Take the next generation and adopt the session's roles.
    ///
    /// Returns `None` without touching anything if `session` is not the
    /// bound store's current session.
    fn issue(&self, session: Option<&AuthenticatedSession>) -> Option<Ticket> {
        let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_live(session) {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        match session {
            Some(session) => {
                let roles = session.identity.roles.iter().cloned().collect();
                self.roles.store(Arc::new(roles));
            }
            None => {
                self.roles.store(Arc::new(Vec::new()));
                self.map.store(Arc::new(RolePermissionMap::new()));
                info!("Permissions cleared");
            }
        }
        Some(Ticket(generation))
    }

    async fn fetch_and_commit(
        &self,
        ticket: Ticket,
        session: &AuthenticatedSession,
    ) -> Result<RefreshOutcome, RefreshError> {
        let roles = match self.api.list_roles(&session.credential).await {
            Ok(roles) => roles,
            Err(e) if !self.is_current(ticket) => {
                debug!(error = %e, "Ignoring failure of superseded refresh");
                return Ok(RefreshOutcome::Superseded);
            }
            Err(ApiError::Unauthorized(body)) => {
                warn!(user = %session.identity.id, "Credential rejected while refreshing permissions");
                return Err(RefreshError::Authentication(body));
            }
            Err(e) => {
                warn!(error = %e, "Permission refresh failed, keeping previous permissions");
                return Ok(RefreshOutcome::KeptStale);
            }
        };

        for role in &roles {
            for name in role.malformed_permissions() {
                debug!(role = %role.name, permission = name, "Skipping malformed permission name");
            }
        }
        let map = RolePermissionMap::from_roles(&roles);

        let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != ticket.0 || !self.is_live(Some(session)) {
            debug!(generation = ticket.0, "Discarding superseded permission refresh");
            return Ok(RefreshOutcome::Superseded);
        }
        self.map.store(Arc::new(map));
        info!(roles = roles.len(), "Permissions refreshed");
        Ok(RefreshOutcome::Applied)
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Whether `session` is the bound store's current session. Always true
    /// for an unbound resolver.
    fn is_live(&self, session: Option<&AuthenticatedSession>) -> bool {
        self.sessions
            .as_ref()
            .is_none_or(|sessions| same_session(sessions.borrow().session.as_ref(), session))
    }
}

fn same_session(a: Option<&AuthenticatedSession>, b: Option<&AuthenticatedSession>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.identity == b.identity && a.credential.expose() == b.credential.expose()
        }
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use matricula_core::{Credential, Identity};
    use serde_json::json;

    use super::*;
    use crate::config::ApiConfig;
    use crate::session::SessionState;

    fn resolver(server: &MockServer) -> PermissionResolver {
        PermissionResolver::new(
            ApiClient::new(&ApiConfig {
                auth_base_url: server.url("/api/auth").parse().unwrap(),
                api_base_url: server.url("/api").parse().unwrap(),
                timeout: Duration::from_secs(5),
            })
            .unwrap(),
        )
    }

    fn session(token: &str, roles: &[&str]) -> AuthenticatedSession {
        AuthenticatedSession::new(
            Identity {
                id: format!("{token}@uni.edu"),
                email: format!("{token}@uni.edu"),
                display_name: token.to_owned(),
                avatar_url: None,
                roles: roles.iter().map(|r| (*r).to_owned()).collect(),
            },
            Credential::new(token),
        )
    }

    async fn mock_roles(server: &MockServer, token: &str, body: serde_json::Value, delay_ms: u64) {
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/auth/roles")
                    .header("authorization", format!("Bearer {token}"));
                then.status(200)
                    .json_body(body)
                    .delay(Duration::from_millis(delay_ms));
            })
            .await;
    }

    #[tokio::test]
    async fn test_fallback_answers_before_first_refresh() {
        let server = MockServer::start_async().await;
        let resolver = resolver(&server);

        // No roles yet
        assert!(!resolver.has_permission(Resource::Cursos, Operation::Read));

        resolver.issue(Some(&session("t", &["ESTUDIANTE"])));
        assert!(resolver.has_permission(Resource::Cursos, Operation::Read));
        assert!(!resolver.has_permission(Resource::Cursos, Operation::Delete));
    }

    #[tokio::test]
    async fn test_backend_entry_shadows_fallback() {
        let server = MockServer::start_async().await;
        mock_roles(
            &server,
            "op",
            json!([{"id": 2, "nombre": "OPERADOR", "permisos": ["cursos:READ"]}]),
            0,
        )
        .await;
        let resolver = resolver(&server);

        let outcome = resolver.refresh(Some(&session("op", &["OPERADOR"]))).await.unwrap();

        assert_eq!(outcome, RefreshOutcome::Applied);
        assert!(resolver.has_permission(Resource::Cursos, Operation::Read));
        // The fallback grants these to OPERADOR, the backend does not
        assert!(!resolver.has_permission(Resource::Matriculas, Operation::Create));
        assert!(!resolver.has_permission(Resource::Secciones, Operation::Update));
    }

    #[tokio::test]
    async fn test_malformed_names_are_skipped() {
        let server = MockServer::start_async().await;
        mock_roles(
            &server,
            "op",
            json!([{"id": 7, "nombre": "CUSTOM", "permisos": ["cursos", "cursos:READ:x", "aulas:READ", "cursos:READ"]}]),
            0,
        )
        .await;
        let resolver = resolver(&server);

        resolver.refresh(Some(&session("op", &["CUSTOM"]))).await.unwrap();

        assert!(resolver.has_permission(Resource::Cursos, Operation::Read));
        assert_eq!(
            resolver.backend_map().operations("CUSTOM", Resource::Cursos).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_refresh_none_clears() {
        let server = MockServer::start_async().await;
        mock_roles(
            &server,
            "admin",
            json!([{"id": 1, "nombre": "ADMIN_MATRICULA", "permisos": ["usuarios:READ"]}]),
            0,
        )
        .await;
        let resolver = resolver(&server);
        resolver
            .refresh(Some(&session("admin", &["ADMIN_MATRICULA"])))
            .await
            .unwrap();
        assert!(resolver.has_permission(Resource::Usuarios, Operation::Read));

        assert_eq!(resolver.refresh(None).await.unwrap(), RefreshOutcome::Cleared);

        assert!(resolver.backend_map().is_empty());
        assert!(resolver.roles().is_empty());
        assert!(!resolver.has_permission(Resource::Usuarios, Operation::Read));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_table() {
        let server = MockServer::start_async().await;
        mock_roles(
            &server,
            "good",
            json!([{"id": 2, "nombre": "OPERADOR", "permisos": ["cursos:READ"]}]),
            0,
        )
        .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/auth/roles")
                    .header("authorization", "Bearer flaky");
                then.status(503);
            })
            .await;
        let resolver = resolver(&server);
        resolver.refresh(Some(&session("good", &["OPERADOR"]))).await.unwrap();

        let outcome = resolver.refresh(Some(&session("flaky", &["OPERADOR"]))).await.unwrap();

        assert_eq!(outcome, RefreshOutcome::KeptStale);
        assert!(resolver.backend_map().contains_role("OPERADOR"));
        assert!(!resolver.has_permission(Resource::Matriculas, Operation::Create));
    }

    #[tokio::test]
    async fn test_forbidden_is_not_an_authentication_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/auth/roles");
                then.status(403);
            })
            .await;
        let resolver = resolver(&server);

        let outcome = resolver.refresh(Some(&session("t", &["ESTUDIANTE"]))).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::KeptStale);
        assert!(resolver.has_permission(Resource::Secciones, Operation::Read));
    }

    #[tokio::test]
    async fn test_unauthorized_propagates() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/auth/roles");
                then.status(401).body("token expired");
            })
            .await;
        let resolver = resolver(&server);

        let err = resolver
            .refresh(Some(&session("expired", &["OPERADOR"])))
            .await
            .unwrap_err();

        assert!(matches!(err, RefreshError::Authentication(body) if body == "token expired"));
        assert!(resolver.backend_map().is_empty());
    }

    #[tokio::test]
    async fn test_last_issued_refresh_wins() {
        let server = MockServer::start_async().await;
        mock_roles(
            &server,
            "a",
            json!([{"id": 1, "nombre": "A", "permisos": ["cursos:DELETE"]}]),
            300,
        )
        .await;
        mock_roles(
            &server,
            "b",
            json!([{"id": 2, "nombre": "B", "permisos": ["cursos:READ"]}]),
            0,
        )
        .await;
        let resolver = resolver(&server);
        let a = session("a", &["A", "B"]);
        let b = session("b", &["A", "B"]);

        let (first, second) = tokio::join!(resolver.refresh(Some(&a)), resolver.refresh(Some(&b)));

        assert_eq!(first.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(second.unwrap(), RefreshOutcome::Applied);
        assert!(resolver.backend_map().contains_role("B"));
        assert!(!resolver.backend_map().contains_role("A"));
    }

    #[tokio::test]
    async fn test_refresh_discarded_after_sign_out() {
        let server = MockServer::start_async().await;
        mock_roles(
            &server,
            "slow",
            json!([{"id": 1, "nombre": "OPERADOR", "permisos": ["cursos:READ"]}]),
            200,
        )
        .await;
        let resolver = resolver(&server);
        let slow = session("slow", &["OPERADOR"]);

        let (first, cleared) = tokio::join!(resolver.refresh(Some(&slow)), resolver.refresh(None));

        assert_eq!(first.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(cleared.unwrap(), RefreshOutcome::Cleared);
        assert!(resolver.backend_map().is_empty());
    }

    #[tokio::test]
    async fn test_bound_resolver_rejects_stale_session() {
        let server = MockServer::start_async().await;
        mock_roles(
            &server,
            "old",
            json!([{"id": 1, "nombre": "ADMIN_MATRICULA", "permisos": ["cursos:DELETE"]}]),
            0,
        )
        .await;
        let old = session("old", &["ADMIN_MATRICULA"]);
        let (tx, rx) = watch::channel(SessionSnapshot {
            state: SessionState::Authenticated,
            session: Some(old.clone()),
        });
        let resolver = resolver(&server).with_sessions(rx);
        resolver.refresh(Some(&old)).await.unwrap();

        // Signed out after the caller took its snapshot
        tx.send_replace(SessionSnapshot {
            state: SessionState::Unauthenticated,
            session: None,
        });
        resolver.refresh(None).await.unwrap();
        let outcome = resolver.refresh(Some(&old)).await.unwrap();

        assert_eq!(outcome, RefreshOutcome::Superseded);
        assert!(resolver.roles().is_empty());
        assert!(resolver.backend_map().is_empty());
        assert!(!resolver.has_permission(Resource::Cursos, Operation::Delete));
    }

    #[tokio::test]
    async fn test_bound_resolver_discards_result_after_sign_out() {
        let server = MockServer::start_async().await;
        mock_roles(
            &server,
            "slow",
            json!([{"id": 1, "nombre": "OPERADOR", "permisos": ["cursos:DELETE"]}]),
            300,
        )
        .await;
        let slow = session("slow", &["OPERADOR"]);
        let (tx, rx) = watch::channel(SessionSnapshot {
            state: SessionState::Authenticated,
            session: Some(slow.clone()),
        });
        let resolver = resolver(&server).with_sessions(rx);

        let sign_out = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send_replace(SessionSnapshot {
                state: SessionState::Unauthenticated,
                session: None,
            });
        };
        let (outcome, ()) = tokio::join!(resolver.refresh(Some(&slow)), sign_out);

        assert_eq!(outcome.unwrap(), RefreshOutcome::Superseded);
        assert!(resolver.backend_map().is_empty());
    }

    #[tokio::test]
    async fn test_named_lookup() {
        let server = MockServer::start_async().await;
        let resolver = resolver(&server);
        resolver.issue(Some(&session("t", &["ADMIN_MATRICULA"])));

        assert!(resolver.has_permission_named("usuarios", "DELETE"));
        assert!(!resolver.has_permission_named("usuarios", "delete"));
        assert!(!resolver.has_permission_named("aulas", "READ"));
    }

    #[tokio::test]
    async fn test_follow_refreshes_on_session_change() {
        let server = MockServer::start_async().await;
        mock_roles(
            &server,
            "op",
            json!([{"id": 2, "nombre": "OPERADOR", "permisos": ["profesores:UPDATE"]}]),
            0,
        )
        .await;
        let resolver = Arc::new(resolver(&server));
        let (tx, rx) = watch::channel(SessionSnapshot {
            state: SessionState::Loading,
            session: None,
        });
        let handle = Arc::clone(&resolver).follow(rx);

        tx.send_replace(SessionSnapshot {
            state: SessionState::Authenticated,
            session: Some(session("op", &["OPERADOR"])),
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while !resolver.has_permission(Resource::Profesores, Operation::Update) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        tx.send_replace(SessionSnapshot {
            state: SessionState::Unauthenticated,
            session: None,
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while !resolver.roles().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(resolver.backend_map().is_empty());

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

//! The console facade.
//!
//! Owns one [`SessionStore`] and one [`PermissionResolver`] and keeps them
//! in step: every identity change is followed by a permission refresh, and a
//! credential the backend refuses ends the session. The resolver is bound to
//! the store, so a refresh for a session that has since ended is discarded.
//!
//! Role administration asks the resolver first: listings need `roles:READ`
//! or `permisos:READ`, changes need `permisos:UPDATE`. The check only decides
//! what the console offers; the backend still enforces its own rules.

use std::sync::Arc;

use matricula_core::{
    Operation, Permission, PermissionId, PermissionName, Resource, Role, RoleId,
};
use secrecy::SecretString;
use tracing::{info, warn};

use crate::admin::{AdminError, RoleAdmin};
use crate::api::ApiClient;
use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use crate::permissions::{PermissionResolver, RefreshError, RefreshOutcome};
use crate::provider::IdentityProvider;
use crate::session::{LoginOutcome, SessionStore};
use crate::storage::FileStorage;

/// Session, permissions and role administration behind one handle.
#[derive(Debug, Clone)]
pub struct Console {
    api: ApiClient,
    session: Arc<SessionStore>,
    permissions: Arc<PermissionResolver>,
}

impl Console {
    /// A console for `config`, persisting the session under
    /// `config.session_dir`. Federated sign-in needs a `provider`.
    ///
    /// # Errors
    ///
    /// Returns `ConsoleError::Api` if the HTTP client cannot be built.
    pub fn new(
        config: &ConsoleConfig,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Result<Self, ConsoleError> {
        let api = ApiClient::new(&config.api)?;
        let storage = Arc::new(FileStorage::new(&config.session_dir));

        let mut session = SessionStore::new(api.clone(), storage)
            .require_second_factor(config.require_second_factor);
        if let Some(provider) = provider {
            session = session.with_provider(provider);
        }
        Ok(Self::from_parts(api, session))
    }

    /// A console over an already configured session store.
    #[must_use]
    pub fn from_parts(api: ApiClient, session: SessionStore) -> Self {
        let permissions =
            Arc::new(PermissionResolver::new(api.clone()).with_sessions(session.subscribe()));
        Self {
            api,
            session: Arc::new(session),
            permissions,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    #[must_use]
    pub fn permissions(&self) -> &Arc<PermissionResolver> {
        &self.permissions
    }

    /// Restore the persisted session and load its permissions.
    ///
    /// Returns whether a session was restored.
    ///
    /// # Errors
    ///
    /// Returns `ConsoleError::Session` if storage cannot be read and
    /// `ConsoleError::Refresh` if the restored credential is refused (the
    /// session is then signed out).
    pub async fn start(&self) -> Result<bool, ConsoleError> {
        let restored = self.session.restore_session().await?;
        self.refresh_permissions().await?;
        Ok(restored)
    }

    /// Sign in with a username (or email) and password.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::login_with_password`].
    pub async fn login_with_password(
        &self,
        identifier: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, ConsoleError> {
        let outcome = self.session.login_with_password(identifier, password).await?;
        self.after_login(&outcome).await?;
        Ok(outcome)
    }

    /// Sign in through the identity provider.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::login_with_federated_identity`].
    pub async fn login_with_federated_identity(&self) -> Result<LoginOutcome, ConsoleError> {
        let outcome = self.session.login_with_federated_identity().await?;
        self.after_login(&outcome).await?;
        Ok(outcome)
    }

    /// Submit the pending second-factor code.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::verify_second_factor`].
    pub async fn verify_second_factor(&self, code: &str) -> Result<bool, ConsoleError> {
        let verified = self.session.verify_second_factor(code).await?;
        if verified {
            self.refresh_permissions().await?;
        }
        Ok(verified)
    }

    /// Sign out and forget all permissions.
    pub async fn logout(&self) {
        self.session.logout().await;
        if let Err(e) = self.permissions.refresh(None).await {
            // Clearing never fetches; nothing can be refused
            warn!(error = %e, "Unexpected error clearing permissions");
        }
    }

    /// Reload permissions for the current session.
    ///
    /// # Errors
    ///
    /// Returns `ConsoleError::Refresh` if the backend refuses the
    /// credential; the session is signed out first.
    pub async fn refresh_permissions(&self) -> Result<RefreshOutcome, ConsoleError> {
        let current = self.session.current();
        match self.permissions.refresh(current.as_ref()).await {
            Ok(outcome) => Ok(outcome),
            Err(e @ RefreshError::Authentication(_)) => {
                info!("Credential refused, signing out");
                self.logout().await;
                Err(e.into())
            }
        }
    }

    /// Whether the current user may perform `operation` on `resource`.
    #[must_use]
    pub fn has_permission(&self, resource: Resource, operation: Operation) -> bool {
        self.permissions.has_permission(resource, operation)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.session.has_role(role)
    }

    /// Role administration for the current credential.
    ///
    /// The returned handle does no permission checks of its own.
    ///
    /// # Errors
    ///
    /// Returns `ConsoleError::NotAuthenticated` when signed out.
    pub fn admin(&self) -> Result<RoleAdmin, ConsoleError> {
        let credential = self
            .session
            .credential()
            .ok_or(ConsoleError::NotAuthenticated)?;
        Ok(RoleAdmin::new(self.api.clone(), credential))
    }

    /// Every role with its permission names. Needs `roles:READ`.
    ///
    /// # Errors
    ///
    /// Returns `ConsoleError::NotAuthenticated` when signed out,
    /// `ConsoleError::Forbidden` without the permission and
    /// `ConsoleError::Admin` if the request fails.
    pub async fn list_roles(&self) -> Result<Vec<Role>, ConsoleError> {
        let admin = self.admin()?;
        self.require(Resource::Roles, Operation::Read)?;
        let result = admin.list_roles().await;
        self.guard(result).await
    }

    /// The permission catalog. Needs `permisos:READ`.
    ///
    /// # Errors
    ///
    /// See [`list_roles`](Self::list_roles).
    pub async fn list_permissions(&self) -> Result<Vec<Permission>, ConsoleError> {
        let admin = self.admin()?;
        self.require(Resource::Permisos, Operation::Read)?;
        let result = admin.list_permissions().await;
        self.guard(result).await
    }

    /// Grant a permission to a role and reload permissions. Needs
    /// `permisos:UPDATE`.
    ///
    /// # Errors
    ///
    /// See [`list_roles`](Self::list_roles).
    pub async fn grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<Role, ConsoleError> {
        let admin = self.editor()?;
        let result = admin.grant(role_id, permission_id).await;
        self.changed(result).await
    }

    /// Revoke a permission from a role and reload permissions. Needs
    /// `permisos:UPDATE`.
    ///
    /// # Errors
    ///
    /// See [`list_roles`](Self::list_roles).
    pub async fn revoke(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<Role, ConsoleError> {
        let admin = self.editor()?;
        let result = admin.revoke(role_id, permission_id).await;
        self.changed(result).await
    }

    /// Set one permission-matrix cell and reload permissions. Needs
    /// `permisos:UPDATE`.
    ///
    /// # Errors
    ///
    /// See [`list_roles`](Self::list_roles) and
    /// [`RoleAdmin::set_permission`].
    pub async fn set_permission(
        &self,
        role_id: RoleId,
        resource: Resource,
        operation: Operation,
        granted: bool,
    ) -> Result<Role, ConsoleError> {
        let admin = self.editor()?;
        let result = admin
            .set_permission(role_id, resource, operation, granted)
            .await;
        self.changed(result).await
    }

    async fn after_login(&self, outcome: &LoginOutcome) -> Result<(), ConsoleError> {
        if matches!(outcome, LoginOutcome::Authenticated(_)) {
            self.refresh_permissions().await?;
        }
        Ok(())
    }

    /// Fail unless the current user may perform `operation` on `resource`.
    fn require(&self, resource: Resource, operation: Operation) -> Result<(), ConsoleError> {
        if self.has_permission(resource, operation) {
            Ok(())
        } else {
            Err(ConsoleError::Forbidden(PermissionName::new(resource, operation)))
        }
    }

    /// Role administration for editing the permission matrix.
    fn editor(&self) -> Result<RoleAdmin, ConsoleError> {
        let admin = self.admin()?;
        self.require(Resource::Permisos, Operation::Update)?;
        Ok(admin)
    }

    /// Sign out if the backend refused the credential.
    async fn guard<T>(&self, result: Result<T, AdminError>) -> Result<T, ConsoleError> {
        if let Err(e) = &result
            && e.is_unauthorized()
        {
            info!("Credential refused, signing out");
            self.logout().await;
        }
        Ok(result?)
    }

    async fn changed(&self, result: Result<Role, AdminError>) -> Result<Role, ConsoleError> {
        let role = self.guard(result).await?;
        self.refresh_permissions().await?;
        Ok(role)
    }
}

//! Role administration.
//!
//! Backs the permission-matrix screen: list roles and the permission
//! catalog, and toggle single `resource:OPERATION` grants on a role.

use matricula_core::{
    Credential, Operation, Permission, PermissionId, PermissionMatrix, PermissionName, Resource,
    Role, RoleId,
};
use thiserror::Error;
use tracing::{info, instrument};

use crate::api::{ApiClient, ApiError};

/// Errors that can occur while editing roles.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Backend request failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The catalog has no permission with this name.
    #[error("Permission {0} is not defined in the catalog")]
    UndefinedPermission(PermissionName),
}

impl AdminError {
    /// Whether the failure means the credential is no longer accepted.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_unauthorized())
    }
}

/// Role and permission management for one credential.
#[derive(Clone)]
pub struct RoleAdmin {
    api: ApiClient,
    credential: Credential,
}

impl RoleAdmin {
    #[must_use]
    pub const fn new(api: ApiClient, credential: Credential) -> Self {
        Self { api, credential }
    }

    /// Every role with its permission names.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Api` if the request fails.
    pub async fn list_roles(&self) -> Result<Vec<Role>, AdminError> {
        Ok(self.api.list_roles(&self.credential).await?)
    }

    /// The permission catalog.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Api` if the request fails.
    pub async fn list_permissions(&self) -> Result<Vec<Permission>, AdminError> {
        Ok(self.api.list_permissions(&self.credential).await?)
    }

    /// Grant a permission to a role.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Api` if the request fails.
    #[instrument(skip(self))]
    pub async fn grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<Role, AdminError> {
        let role = self
            .api
            .grant_permission(&self.credential, role_id, permission_id)
            .await?;
        info!(role = %role.name, "Permission granted");
        Ok(role)
    }

    /// Revoke a permission from a role.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Api` if the request fails.
    #[instrument(skip(self))]
    pub async fn revoke(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<Role, AdminError> {
        let role = self
            .api
            .revoke_permission(&self.credential, role_id, permission_id)
            .await?;
        info!(role = %role.name, "Permission revoked");
        Ok(role)
    }

    /// Set one matrix cell: grant or revoke `resource:OPERATION` on a role.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::UndefinedPermission` if the catalog has no such
    /// permission, `AdminError::Api` if a request fails.
    #[instrument(skip(self))]
    pub async fn set_permission(
        &self,
        role_id: RoleId,
        resource: Resource,
        operation: Operation,
        granted: bool,
    ) -> Result<Role, AdminError> {
        let name = PermissionName::new(resource, operation);
        let catalog = self.list_permissions().await?;
        let permission_id =
            find_permission(&catalog, name).ok_or(AdminError::UndefinedPermission(name))?;

        if granted {
            self.grant(role_id, permission_id).await
        } else {
            self.revoke(role_id, permission_id).await
        }
    }

    /// The checkbox grid for `role`.
    #[must_use]
    pub fn matrix(role: &Role) -> PermissionMatrix {
        PermissionMatrix::for_role(role)
    }
}

fn find_permission(catalog: &[Permission], name: PermissionName) -> Option<PermissionId> {
    let wanted = name.to_string();
    catalog
        .iter()
        .find(|permission| permission.name == wanted)
        .map(|permission| permission.id)
}

//! Role administration commands.
//!
//! # Usage
//!
//! ```bash
//! matricula roles list
//! matricula roles grant 2 14
//! matricula roles set 2 cursos:UPDATE --revoke
//! matricula permissions
//! ```

use matricula_console::{Console, ConsoleError};
use matricula_core::{PermissionId, PermissionName, Role, RoleId};

use super::{CliError, emit};

/// List roles with their permissions.
pub async fn list(console: &Console) -> Result<(), CliError> {
    for role in console.list_roles().await? {
        log_role(&role);
    }
    Ok(())
}

/// List the permission catalog.
pub async fn catalog(console: &Console) -> Result<(), CliError> {
    for permission in console.list_permissions().await? {
        emit(format_args!("{:>4}  {}", permission.id, permission.name));
    }
    Ok(())
}

/// Grant a permission to a role by ID.
pub async fn grant(console: &Console, role_id: i64, permission_id: i64) -> Result<(), CliError> {
    let role = console
        .grant(RoleId::new(role_id), PermissionId::new(permission_id))
        .await?;
    log_role(&role);
    Ok(())
}

/// Revoke a permission from a role by ID.
pub async fn revoke(console: &Console, role_id: i64, permission_id: i64) -> Result<(), CliError> {
    let role = console
        .revoke(RoleId::new(role_id), PermissionId::new(permission_id))
        .await?;
    log_role(&role);
    Ok(())
}

/// Grant or revoke a permission by `resource:OPERATION` name.
pub async fn set(
    console: &Console,
    role_id: i64,
    permission: &str,
    granted: bool,
) -> Result<(), CliError> {
    let name = PermissionName::parse(permission).map_err(ConsoleError::Validation)?;

    let role = console
        .set_permission(RoleId::new(role_id), name.resource, name.operation, granted)
        .await?;
    log_role(&role);
    Ok(())
}

fn log_role(role: &Role) {
    emit(role_line(role));
}

fn role_line(role: &Role) -> String {
    format!("{:>4}  {:<18} {}", role.id, role.name, role.permissions.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_line() {
        let role = Role {
            id: RoleId::new(2),
            name: "OPERADOR".to_owned(),
            description: None,
            permissions: vec!["cursos:READ".to_owned(), "secciones:UPDATE".to_owned()],
        };

        assert_eq!(
            role_line(&role),
            "   2  OPERADOR           cursos:READ, secciones:UPDATE"
        );
    }
}

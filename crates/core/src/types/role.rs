//! Role and permission records as served by the auth backend.

use serde::{Deserialize, Serialize};

use super::id::{PermissionId, RoleId};
use super::permission::PermissionName;

/// A named bundle of permissions.
///
/// The backend speaks Spanish on the wire (`nombre`, `descripcion`,
/// `permisos`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    /// Permission names in backend order; not validated.
    #[serde(rename = "permisos", default)]
    pub permissions: Vec<String>,
}

impl Role {
    /// Permission names that parse, in backend order.
    ///
    /// Malformed names are skipped.
    pub fn parsed_permissions(&self) -> impl Iterator<Item = PermissionName> + '_ {
        self.permissions
            .iter()
            .filter_map(|name| PermissionName::parse(name).ok())
    }

    /// Permission names that do not parse.
    pub fn malformed_permissions(&self) -> impl Iterator<Item = &str> + '_ {
        self.permissions
            .iter()
            .filter(|name| PermissionName::parse(name).is_err())
            .map(String::as_str)
    }
}

/// An entry of the permission catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    #[serde(rename = "nombre")]
    pub name: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{Operation, Resource};

    #[test]
    fn test_role_from_wire() {
        let role: Role = serde_json::from_str(
            r#"{"id": 2, "nombre": "OPERADOR", "descripcion": null,
                "permisos": ["secciones:UPDATE", "cursos", "aulas:READ"]}"#,
        )
        .unwrap();

        assert_eq!(role.id, RoleId::new(2));
        assert_eq!(role.name, "OPERADOR");
        assert_eq!(role.description, None);
        assert_eq!(
            role.parsed_permissions().collect::<Vec<_>>(),
            vec![PermissionName::new(Resource::Secciones, Operation::Update)]
        );
        assert_eq!(
            role.malformed_permissions().collect::<Vec<_>>(),
            vec!["cursos", "aulas:READ"]
        );
    }

    #[test]
    fn test_role_without_permissions() {
        let role: Role = serde_json::from_str(r#"{"id": 5, "nombre": "INVITADO"}"#).unwrap();
        assert!(role.permissions.is_empty());
    }

    #[test]
    fn test_permission_from_wire() {
        let permission: Permission =
            serde_json::from_str(r#"{"id": 11, "nombre": "cursos:READ"}"#).unwrap();
        assert_eq!(permission.id, PermissionId::new(11));
        assert_eq!(permission.name, "cursos:READ");
    }
}

//! Role → resource → operation grant tables and the lookup over them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::permission::{Operation, PermissionName, Resource};
use super::role::Role;

use Operation::{Create, Delete, Read, Update};

type ResourceGrants = BTreeMap<Resource, BTreeSet<Operation>>;

/// Resolved grants per role name.
///
/// Built in one pass from a role list and never mutated afterwards; holders
/// replace the whole map when the role list changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePermissionMap {
    roles: BTreeMap<String, ResourceGrants>,
}

impl RolePermissionMap {
    /// An empty map (no role has an entry).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            roles: BTreeMap::new(),
        }
    }

    /// Build the map from backend roles.
    ///
    /// Every role gets an entry, even one whose permissions are all
    /// malformed. Names that do not parse as `resource:OPERATION` are skipped.
    #[must_use]
    pub fn from_roles(roles: &[Role]) -> Self {
        let roles = roles
            .iter()
            .map(|role| {
                let mut grants = ResourceGrants::new();
                for name in role.parsed_permissions() {
                    grants.entry(name.resource).or_default().insert(name.operation);
                }
                (role.name.clone(), grants)
            })
            .collect();
        Self { roles }
    }

    /// Whether the map has any entry for `role`.
    #[must_use]
    pub fn contains_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Whether `role` is granted `operation` on `resource`.
    #[must_use]
    pub fn grants(&self, role: &str, resource: Resource, operation: Operation) -> bool {
        self.roles
            .get(role)
            .and_then(|grants| grants.get(&resource))
            .is_some_and(|operations| operations.contains(&operation))
    }

    /// Operations granted to `role` on `resource`.
    pub fn operations(&self, role: &str, resource: Resource) -> impl Iterator<Item = Operation> + '_ {
        self.roles
            .get(role)
            .and_then(|grants| grants.get(&resource))
            .into_iter()
            .flatten()
            .copied()
    }

    /// Role names with an entry.
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    fn from_table(table: &[(&str, &[(Resource, &[Operation])])]) -> Self {
        let roles = table
            .iter()
            .map(|(role, resources)| {
                let grants = resources
                    .iter()
                    .map(|(resource, operations)| (*resource, operations.iter().copied().collect()))
                    .collect();
                ((*role).to_owned(), grants)
            })
            .collect();
        Self { roles }
    }
}

const CRUD: &[Operation] = &[Create, Read, Update, Delete];

/// Default grants for the three built-in roles.
const FALLBACK_TABLE: &[(&str, &[(Resource, &[Operation])])] = &[
    (
        "ADMIN_MATRICULA",
        &[
            (Resource::Usuarios, CRUD),
            (Resource::Roles, CRUD),
            (Resource::Permisos, CRUD),
            (Resource::Cursos, CRUD),
            (Resource::Profesores, CRUD),
            (Resource::Secciones, CRUD),
            (Resource::Estudiantes, CRUD),
            (Resource::Matriculas, CRUD),
        ],
    ),
    (
        "OPERADOR",
        &[
            (Resource::Cursos, &[Read]),
            (Resource::Profesores, &[Read]),
            (Resource::Secciones, &[Read, Update]),
            (Resource::Estudiantes, &[Create, Read, Update]),
            (Resource::Matriculas, CRUD),
        ],
    ),
    (
        "ESTUDIANTE",
        &[
            (Resource::Cursos, &[Read]),
            (Resource::Secciones, &[Read]),
            (Resource::Matriculas, &[Read]),
        ],
    ),
];

static FALLBACK: LazyLock<RolePermissionMap> =
    LazyLock::new(|| RolePermissionMap::from_table(FALLBACK_TABLE));

/// Compiled-in grants used for roles the backend has not described.
#[must_use]
pub fn static_fallback() -> &'static RolePermissionMap {
    &FALLBACK
}

/// Decide whether any of `roles` may perform `operation` on `resource`.
///
/// Lookup is per role: a role with an entry in `backend` is answered by
/// `backend` alone, even when that entry denies. Only roles with no backend
/// entry at all are looked up in `fallback`.
pub fn resolve<'a, I>(
    backend: &RolePermissionMap,
    fallback: &RolePermissionMap,
    roles: I,
    resource: Resource,
    operation: Operation,
) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    roles.into_iter().any(|role| {
        if backend.contains_role(role) {
            backend.grants(role, resource, operation)
        } else {
            fallback.grants(role, resource, operation)
        }
    })
}

/// Resource × operation checkbox grid for a single role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatrix {
    cells: BTreeMap<Resource, BTreeMap<Operation, bool>>,
}

impl PermissionMatrix {
    /// A grid with every cell unchecked.
    #[must_use]
    pub fn empty() -> Self {
        let cells = Resource::ALL
            .into_iter()
            .map(|resource| {
                let row = Operation::ALL.into_iter().map(|op| (op, false)).collect();
                (resource, row)
            })
            .collect();
        Self { cells }
    }

    /// The grid for `role`, ignoring malformed permission names.
    #[must_use]
    pub fn for_role(role: &Role) -> Self {
        let mut matrix = Self::empty();
        for name in role.parsed_permissions() {
            matrix.set(name, true);
        }
        matrix
    }

    #[must_use]
    pub fn is_granted(&self, resource: Resource, operation: Operation) -> bool {
        self.cells
            .get(&resource)
            .and_then(|row| row.get(&operation))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, name: PermissionName, granted: bool) {
        self.cells
            .entry(name.resource)
            .or_default()
            .insert(name.operation, granted);
    }

    /// Rows in resource order, each with its operations in CRUD order.
    pub fn rows(&self) -> impl Iterator<Item = (Resource, Vec<(Operation, bool)>)> + '_ {
        self.cells.iter().map(|(resource, row)| {
            (
                *resource,
                row.iter().map(|(op, granted)| (*op, *granted)).collect(),
            )
        })
    }
}

impl Default for PermissionMatrix {
    fn default() -> Self {
        Self::empty()
    }
}

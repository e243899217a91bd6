//! Permission vocabulary.
//!
//! The backend names every capability `resource:OPERATION` (e.g.
//! `cursos:READ`). Both halves come from a closed vocabulary, so they are
//! modelled as enums and validated once, when a name is parsed.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PermissionName`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionParseError {
    /// The name has no `:` separator.
    #[error("permission name `{0}` is missing the `resource:operation` separator")]
    MissingSeparator(String),
    /// The name has more than one `:` separator.
    #[error("permission name `{0}` has more than two segments")]
    TooManySegments(String),
    /// The resource half is not part of the vocabulary.
    #[error("unknown resource `{0}`")]
    UnknownResource(String),
    /// The operation half is not part of the vocabulary.
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
}

/// A resource managed by the enrollment console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// Console user accounts.
    Usuarios,
    /// Role definitions.
    Roles,
    /// Permission catalog.
    Permisos,
    /// Courses.
    Cursos,
    /// Professors.
    Profesores,
    /// Course sections.
    Secciones,
    /// Students.
    Estudiantes,
    /// Enrollments.
    Matriculas,
}

impl Resource {
    /// Every resource, in the order the console lists them.
    pub const ALL: [Self; 8] = [
        Self::Usuarios,
        Self::Roles,
        Self::Permisos,
        Self::Cursos,
        Self::Profesores,
        Self::Secciones,
        Self::Estudiantes,
        Self::Matriculas,
    ];

    /// Wire name of the resource.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usuarios => "usuarios",
            Self::Roles => "roles",
            Self::Permisos => "permisos",
            Self::Cursos => "cursos",
            Self::Profesores => "profesores",
            Self::Secciones => "secciones",
            Self::Estudiantes => "estudiantes",
            Self::Matriculas => "matriculas",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|resource| resource.as_str() == s)
            .ok_or_else(|| PermissionParseError::UnknownResource(s.to_owned()))
    }
}

/// A CRUD operation on a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    /// Every operation, in CRUD order.
    pub const ALL: [Self; 4] = [Self::Create, Self::Read, Self::Update, Self::Delete];

    /// Wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|operation| operation.as_str() == s)
            .ok_or_else(|| PermissionParseError::UnknownOperation(s.to_owned()))
    }
}

/// A parsed `resource:OPERATION` permission name.
///
/// ## Examples
///
/// ```
/// use matricula_core::{Operation, PermissionName, Resource};
///
/// let name = PermissionName::parse("cursos:READ").unwrap();
/// assert_eq!(name.resource, Resource::Cursos);
/// assert_eq!(name.operation, Operation::Read);
/// assert_eq!(name.to_string(), "cursos:READ");
///
/// assert!(PermissionName::parse("cursos").is_err());
/// assert!(PermissionName::parse("cursos:READ:extra").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionName {
    pub resource: Resource,
    pub operation: Operation,
}

impl PermissionName {
    #[must_use]
    pub const fn new(resource: Resource, operation: Operation) -> Self {
        Self {
            resource,
            operation,
        }
    }

    /// Parse a permission name.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly two `:`-separated
    /// segments, or if either segment is outside the vocabulary.
    pub fn parse(s: &str) -> Result<Self, PermissionParseError> {
        let mut parts = s.split(':');
        let (Some(resource), Some(operation)) = (parts.next(), parts.next()) else {
            return Err(PermissionParseError::MissingSeparator(s.to_owned()));
        };
        if parts.next().is_some() {
            return Err(PermissionParseError::TooManySegments(s.to_owned()));
        }

        Ok(Self {
            resource: resource.parse()?,
            operation: operation.parse()?,
        })
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.operation)
    }
}

impl FromStr for PermissionName {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

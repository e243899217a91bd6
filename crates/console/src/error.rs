//! Console error aggregate.

use matricula_core::{PermissionName, PermissionParseError};
use thiserror::Error;

use crate::admin::AdminError;
use crate::api::ApiError;
use crate::config::ConfigError;
use crate::permissions::RefreshError;
use crate::session::SessionError;

/// Any error surfaced by the console.
///
/// None of these is fatal; front ends show [`notification`](Self::notification)
/// and carry on.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    /// Malformed permission name.
    #[error("Invalid permission: {0}")]
    Validation(#[from] PermissionParseError),

    /// The operation needs a signed-in user.
    #[error("Not signed in")]
    NotAuthenticated,

    /// The current roles do not grant the permission the operation needs.
    #[error("Missing permission {0}")]
    Forbidden(PermissionName),
}

impl ConsoleError {
    /// Short message for a transient notification.
    #[must_use]
    pub fn notification(&self) -> String {
        match self {
            Self::Config(_) => "The console is misconfigured".to_owned(),
            Self::Session(SessionError::Authentication(_)) | Self::Refresh(_) => {
                "Authentication failed, please sign in again".to_owned()
            }
            Self::Session(SessionError::Network(_)) | Self::Api(ApiError::Http(_)) => {
                "Could not reach the server".to_owned()
            }
            Self::Session(SessionError::NoPendingChallenge) => {
                "There is no verification in progress".to_owned()
            }
            Self::Session(SessionError::Storage(_)) => {
                "Could not save the session".to_owned()
            }
            Self::Api(ApiError::RateLimited(secs)) => {
                format!("Too many requests, try again in {secs} seconds")
            }
            Self::Api(ApiError::InvalidResponse(_)) => {
                "The server sent an unexpected response".to_owned()
            }
            Self::Api(e) if e.is_unauthorized() => {
                "Your session has expired, please sign in again".to_owned()
            }
            Self::Admin(e) if e.is_unauthorized() => {
                "Your session has expired, please sign in again".to_owned()
            }
            Self::Admin(AdminError::UndefinedPermission(name)) => {
                format!("Permission {name} is not defined")
            }
            Self::Validation(e) => format!("Invalid permission: {e}"),
            Self::NotAuthenticated => "Please sign in first".to_owned(),
            Self::Forbidden(name) => format!("You are not allowed to do this ({name})"),
            Self::Api(_) | Self::Admin(_) => "The server rejected the request".to_owned(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use matricula_core::{Operation, Resource};

    use super::*;

    #[test]
    fn test_notifications() {
        let err = ConsoleError::from(SessionError::Authentication("bad".to_owned()));
        assert_eq!(err.notification(), "Authentication failed, please sign in again");

        let err = ConsoleError::from(ApiError::Unauthorized(String::new()));
        assert_eq!(err.notification(), "Your session has expired, please sign in again");

        let err = ConsoleError::from(AdminError::UndefinedPermission(PermissionName::new(
            Resource::Cursos,
            Operation::Delete,
        )));
        assert_eq!(err.notification(), "Permission cursos:DELETE is not defined");

        assert_eq!(ConsoleError::NotAuthenticated.notification(), "Please sign in first");

        let err = ConsoleError::Forbidden(PermissionName::new(Resource::Permisos, Operation::Update));
        assert_eq!(err.notification(), "You are not allowed to do this (permisos:UPDATE)");

        let err = ConsoleError::from("cursos".parse::<PermissionName>().unwrap_err());
        assert!(err.notification().starts_with("Invalid permission: "));
    }

    #[test]
    fn test_notification_hides_details() {
        let err = ConsoleError::from(ApiError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: "java.lang.NullPointerException".to_owned(),
        });
        assert!(!err.notification().contains("NullPointer"));
    }
}

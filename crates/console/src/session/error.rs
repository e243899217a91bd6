//! Session error types.

use thiserror::Error;

use crate::api::ApiError;
use crate::provider::ProviderError;
use crate::storage::StorageError;

/// Errors that can occur during session operations.
///
/// A failed operation leaves the previous session untouched.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad credentials, a cancelled provider flow, or a non-success exchange.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The backend could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The session could not be persisted.
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),

    /// A second-factor code was submitted with no login waiting for one.
    #[error("No second-factor challenge is pending")]
    NoPendingChallenge,
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http(e) => Self::Network(e.to_string()),
            ApiError::Unauthorized(body) => Self::Authentication(if body.is_empty() {
                "invalid credentials".to_owned()
            } else {
                body
            }),
            other => Self::Authentication(other.to_string()),
        }
    }
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        Self::Authentication(err.to_string())
    }
}

//! REST client for the enrollment backend.
//!
//! Two services are involved:
//!
//! - the auth service (`authBase`), which exchanges federated tokens or
//!   username/password pairs for a bearer token and verifies second-factor
//!   codes;
//! - the resource API (`apiBase`), which serves roles, permissions and the
//!   academic resources. Every call to it carries the bearer token.

pub mod auth;
pub mod client;

pub use auth::LoginResponse;
pub use client::{ApiClient, authorized_headers};

use thiserror::Error;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP transport failed (connection, timeout, body decoding).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the bearer token or the credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status.
        status: reqwest::StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },

    /// A success response whose body does not have the expected shape.
    #[error("Unexpected response body: {0}")]
    InvalidResponse(String),

    /// The token cannot be sent as an HTTP header value.
    #[error("Credential is not a valid header value")]
    InvalidCredential,
}

impl ApiError {
    /// Whether the failure means the credential is no longer accepted.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

//! Second-factor verification.

use async_trait::async_trait;
use matricula_core::{Credential, SecondFactorCode};

use crate::api::{ApiClient, ApiError};

/// Decides whether a second-factor code completes a pending login.
#[async_trait]
pub trait SecondFactorVerifier: Send + Sync {
    /// Check `code` for the pending session identified by `credential`.
    ///
    /// `Ok(false)` means the code was rejected; errors mean the check itself
    /// could not be made.
    async fn verify(
        &self,
        credential: &Credential,
        code: &SecondFactorCode,
    ) -> Result<bool, ApiError>;
}

/// Verifies codes with the auth service (`POST {authBase}/mfa/verify`).
#[derive(Clone)]
pub struct BackendVerifier {
    api: ApiClient,
}

impl BackendVerifier {
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SecondFactorVerifier for BackendVerifier {
    async fn verify(
        &self,
        credential: &Credential,
        code: &SecondFactorCode,
    ) -> Result<bool, ApiError> {
        self.api.verify_second_factor(credential, code).await
    }
}

//! Federated identity provider seam.
//!
//! The provider runs its own sign-in flow (a browser popup in the web
//! console, a device flow or a pre-issued token in a terminal) and hands back
//! an ID token that the auth service exchanges for a backend session.

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

/// Errors reported by an identity provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The user dismissed the sign-in flow.
    #[error("Sign-in was cancelled")]
    Cancelled,

    /// The provider flow failed.
    #[error("Identity provider error: {0}")]
    Failed(String),
}

/// Result of a successful provider sign-in.
#[derive(Debug, Clone)]
pub struct FederatedToken {
    /// ID token to exchange with the auth service.
    pub id_token: SecretString,
    /// Name the provider knows the user by.
    pub display_name: Option<String>,
    /// Profile picture URL.
    pub photo_url: Option<String>,
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Run the provider's sign-in flow.
    async fn sign_in(&self) -> Result<FederatedToken, ProviderError>;

    /// End the provider-side session.
    async fn sign_out(&self) -> Result<(), ProviderError>;
}

/// Provider for a pre-issued ID token, e.g. one passed on the command line.
///
/// `sign_out` is a no-op.
#[derive(Debug, Clone)]
pub struct StaticIdTokenProvider {
    token: FederatedToken,
}

impl StaticIdTokenProvider {
    pub fn new(id_token: impl Into<String>) -> Self {
        Self {
            token: FederatedToken {
                id_token: SecretString::from(id_token.into()),
                display_name: None,
                photo_url: None,
            },
        }
    }

    /// Attach the profile details the provider would report.
    #[must_use]
    pub fn with_profile(mut self, display_name: Option<String>, photo_url: Option<String>) -> Self {
        self.token.display_name = display_name;
        self.token.photo_url = photo_url;
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdTokenProvider {
    async fn sign_in(&self) -> Result<FederatedToken, ProviderError> {
        Ok(self.token.clone())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Provider for setups without federated sign-in. Every sign-in fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProvider;

#[async_trait]
impl IdentityProvider for NoProvider {
    async fn sign_in(&self) -> Result<FederatedToken, ProviderError> {
        Err(ProviderError::Failed(
            "no identity provider configured".to_owned(),
        ))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticIdTokenProvider::new("google-id-token")
            .with_profile(Some("Ana Pérez".to_owned()), None);

        let token = provider.sign_in().await.unwrap();
        assert_eq!(token.id_token.expose_secret(), "google-id-token");
        assert_eq!(token.display_name.as_deref(), Some("Ana Pérez"));
        assert!(provider.sign_out().await.is_ok());
    }

    #[tokio::test]
    async fn test_no_provider_fails() {
        assert!(matches!(
            NoProvider.sign_in().await,
            Err(ProviderError::Failed(_))
        ));
    }
}

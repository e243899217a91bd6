//! Test doubles for the session seams.
//!
//! Only compiled for tests or with the `testing` feature; nothing here is
//! reachable from a production build.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use matricula_core::{Credential, SecondFactorCode};
use secrecy::SecretString;
use tokio::sync::Mutex;

use crate::api::ApiError;
use crate::provider::{FederatedToken, IdentityProvider, ProviderError};
use crate::session::SecondFactorVerifier;

/// Code accepted by [`FixedCodeVerifier::sentinel`].
pub const SENTINEL_CODE: &str = "123456";

/// Accepts exactly one code, without a network call.
#[derive(Debug, Clone)]
pub struct FixedCodeVerifier {
    code: String,
}

impl FixedCodeVerifier {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// Verifier for the well-known out-of-band test code.
    #[must_use]
    pub fn sentinel() -> Self {
        Self::new(SENTINEL_CODE)
    }
}

#[async_trait]
impl SecondFactorVerifier for FixedCodeVerifier {
    async fn verify(
        &self,
        _credential: &Credential,
        code: &SecondFactorCode,
    ) -> Result<bool, ApiError> {
        Ok(code.as_str() == self.code)
    }
}

/// Identity provider that replays scripted sign-in results.
///
/// Once the script runs out, the last result is repeated.
#[derive(Debug)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<FederatedToken, String>>>,
    fail_sign_out: bool,
    sign_outs: AtomicUsize,
}

impl ScriptedProvider {
    fn with_script(script: Vec<Result<FederatedToken, String>>, fail_sign_out: bool) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fail_sign_out,
            sign_outs: AtomicUsize::new(0),
        }
    }

    /// Provider whose sign-in always succeeds with `id_token`.
    #[must_use]
    pub fn signed_in(id_token: &str, display_name: Option<&str>, photo_url: Option<&str>) -> Self {
        Self::with_script(
            vec![Ok(FederatedToken {
                id_token: SecretString::from(id_token.to_owned()),
                display_name: display_name.map(str::to_owned),
                photo_url: photo_url.map(str::to_owned),
            })],
            false,
        )
    }

    /// Provider whose sign-in always fails with `error`.
    #[must_use]
    pub fn failing(error: ProviderError) -> Self {
        let message = match error {
            ProviderError::Cancelled => None,
            ProviderError::Failed(message) => Some(message),
        };
        Self::with_script(vec![Err(message.unwrap_or_default())], false)
    }

    /// Provider whose sign-in succeeds but whose sign-out always fails.
    #[must_use]
    pub fn failing_sign_out() -> Self {
        let mut provider = Self::signed_in("id-token", None, None);
        provider.fail_sign_out = true;
        provider
    }

    /// Number of `sign_out` calls so far.
    #[must_use]
    pub fn sign_out_calls(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn sign_in(&self) -> Result<FederatedToken, ProviderError> {
        let mut script = self.script.lock().await;
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };

        match next {
            Some(Ok(token)) => Ok(token),
            // An empty message stands for a cancelled flow
            Some(Err(message)) if message.is_empty() => Err(ProviderError::Cancelled),
            Some(Err(message)) => Err(ProviderError::Failed(message)),
            None => Err(ProviderError::Failed("script exhausted".to_owned())),
        }
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out {
            return Err(ProviderError::Failed("sign-out unavailable".to_owned()));
        }
        Ok(())
    }
}

//! Console configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `MATRICULA_AUTH_API_URL` - Auth service base URL (default: `http://localhost:8087/api/auth`)
//! - `MATRICULA_BACKEND_API_URL` - Resource API base URL (default: `http://localhost:8086/api`)
//! - `MATRICULA_SESSION_DIR` - Directory for the persisted session (default: `.matricula`)
//! - `MATRICULA_HTTP_TIMEOUT_SECS` - Request timeout in seconds (default: 30)
//! - `MATRICULA_REQUIRE_MFA` - Require a second factor after every login (default: false)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_AUTH_API_URL: &str = "http://localhost:8087/api/auth";
const DEFAULT_BACKEND_API_URL: &str = "http://localhost:8086/api";
const DEFAULT_SESSION_DIR: &str = ".matricula";
const DEFAULT_TIMEOUT_SECS: &str = "30";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Console configuration.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Backend endpoints and HTTP behaviour
    pub api: ApiConfig,
    /// Directory holding the persisted identity and token
    pub session_dir: PathBuf,
    /// Hold every login until a second factor is verified
    pub require_second_factor: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
}

/// Backend endpoints.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Auth service base, e.g. `http://localhost:8087/api/auth`
    pub auth_base_url: Url,
    /// Resource API base, e.g. `http://localhost:8086/api`
    pub api_base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ConsoleConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let api = ApiConfig {
            auth_base_url: env.url("MATRICULA_AUTH_API_URL", DEFAULT_AUTH_API_URL)?,
            api_base_url: env.url("MATRICULA_BACKEND_API_URL", DEFAULT_BACKEND_API_URL)?,
            timeout: Duration::from_secs(env.parse(
                "MATRICULA_HTTP_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
        };
        let session_dir = PathBuf::from(env.or_default("MATRICULA_SESSION_DIR", DEFAULT_SESSION_DIR));
        let require_second_factor = env.flag("MATRICULA_REQUIRE_MFA")?;

        let sentry_dsn = env.optional("SENTRY_DSN");
        let sentry_environment = env.optional("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = env
            .optional("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            api,
            session_dir,
            require_second_factor,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable; empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    fn url(&self, key: &str, default: &str) -> Result<Url, ConfigError> {
        let url: Url = self.parse(key, default)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(url)
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.optional(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("0" | "false" | "no") => Ok(false),
            Some("1" | "true" | "yes") => Ok(true),
            Some(other) => Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("expected a boolean, got '{other}'"),
            )),
        }
    }
}

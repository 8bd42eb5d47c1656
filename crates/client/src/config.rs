//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//!
//! - `REDSEAM_API_BASE_URL` - API root (default: `https://api.redseam.redberryinternship.ge/api`)
//! - `REDSEAM_API_KEY` - Sent as `X-API-Key` when present
//! - `REDSEAM_SESSION_DIR` - Directory holding the persisted session (default: `.redseam`)
//! - `REDSEAM_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `REDSEAM_SESSION_POLL_SECS` - Session file poll interval where directory notifications are unavailable (default: 2)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default Redseam API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.redseam.redberryinternship.ge/api";

const DEFAULT_SESSION_DIR: &str = ".redseam";
const DEFAULT_REQUEST_TIMEOUT_SECS: &str = "30";
const DEFAULT_SESSION_POLL_SECS: &str = "2";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API connection settings
    pub api: ApiConfig,
    /// Directory for the persisted session file
    pub session_dir: PathBuf,
    /// How often the session file is re-read to pick up changes made by
    /// other processes when directory notifications are unavailable
    pub session_poll_interval: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Redseam API connection settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ApiConfig {
    /// API root, e.g. `https://api.redseam.redberryinternship.ge/api`
    pub base_url: Url,
    /// Optional API key sent as `X-API-Key`
    pub api_key: Option<SecretString>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Settings for an API root with no key and the default timeout.
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(lookup);

        let base_url = env.or_default("REDSEAM_API_BASE_URL", DEFAULT_API_BASE_URL);
        let base_url = Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("REDSEAM_API_BASE_URL".to_string(), e.to_string())
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                "REDSEAM_API_BASE_URL".to_string(),
                format!("unsupported scheme '{}'", base_url.scheme()),
            ));
        }

        let api_key = env
            .optional("REDSEAM_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        let request_timeout = env.seconds("REDSEAM_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let session_dir = PathBuf::from(env.or_default("REDSEAM_SESSION_DIR", DEFAULT_SESSION_DIR));
        let session_poll_interval = env.seconds("REDSEAM_SESSION_POLL_SECS", DEFAULT_SESSION_POLL_SECS)?;
        let sentry_dsn = env.optional("SENTRY_DSN");

        Ok(Self {
            api: ApiConfig {
                base_url,
                api_key,
                request_timeout,
            },
            session_dir,
            session_poll_interval,
            sentry_dsn,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    /// Get an optional variable.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Get a positive number of seconds.
    fn seconds(&self, key: &str, default: &str) -> Result<Duration, ConfigError> {
        let secs = self
            .or_default(key, default)
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
        if secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(Duration::from_secs(secs))
    }
}

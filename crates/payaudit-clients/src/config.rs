//! Collaborator client configuration.
//!
//! Each collaborator is configured from its own group of environment
//! variables. A collaborator whose required variable is absent is simply
//! not configured: `from_env()` returns `Ok(None)` and the service runs
//! without it.
//!
//! Custom `Debug` implementations redact API keys.

use url::Url;
use zeroize::Zeroizing;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("credential for {0} contains characters not allowed in an HTTP header")]
    InvalidCredential(&'static str),
}

// -- Payment ------------------------------------------------------------------

/// Payment processor connection settings.
#[derive(Clone)]
pub struct PaymentConfig {
    pub base_url: Url,
    pub api_key: Zeroizing<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PaymentConfig {
    /// Load from the environment.
    ///
    /// Variables:
    /// - `PAYMENT_API_KEY` (enables the processor)
    /// - `PAYMENT_API_URL` (default: `https://api.stripe.com`)
    /// - `PAYMENT_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = env_opt("PAYMENT_API_KEY") else {
            return Ok(None);
        };
        Ok(Some(Self {
            base_url: env_url("PAYMENT_API_URL", "https://api.stripe.com")?,
            api_key: Zeroizing::new(api_key),
            timeout_secs: env_timeout("PAYMENT_TIMEOUT_SECS"),
        }))
    }
}

// -- Email --------------------------------------------------------------------

/// Email provider connection settings.
#[derive(Clone)]
pub struct EmailConfig {
    pub base_url: Url,
    pub api_key: Zeroizing<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl EmailConfig {
    /// Load from the environment.
    ///
    /// Variables:
    /// - `EMAIL_API_KEY` (enables the provider)
    /// - `EMAIL_API_URL` (default: `https://api.resend.com`)
    /// - `EMAIL_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = env_opt("EMAIL_API_KEY") else {
            return Ok(None);
        };
        Ok(Some(Self {
            base_url: env_url("EMAIL_API_URL", "https://api.resend.com")?,
            api_key: Zeroizing::new(api_key),
            timeout_secs: env_timeout("EMAIL_TIMEOUT_SECS"),
        }))
    }
}

// -- Analysis -----------------------------------------------------------------

/// Analysis engine connection settings. The key is optional.
#[derive(Clone)]
pub struct AnalysisConfig {
    pub base_url: Url,
    pub api_key: Option<Zeroizing<String>>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AnalysisConfig {
    /// Load from the environment.
    ///
    /// Variables:
    /// - `ANALYSIS_API_URL` (enables the engine)
    /// - `ANALYSIS_API_KEY` (optional)
    /// - `ANALYSIS_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(raw) = env_opt("ANALYSIS_API_URL") else {
            return Ok(None);
        };
        let base_url = Url::parse(&raw)
            .map_err(|e| ConfigError::InvalidUrl("ANALYSIS_API_URL".to_string(), e.to_string()))?;
        Ok(Some(Self {
            base_url,
            api_key: env_opt("ANALYSIS_API_KEY").map(Zeroizing::new),
            timeout_secs: env_timeout("ANALYSIS_TIMEOUT_SECS"),
        }))
    }
}

// -- Helpers ------------------------------------------------------------------

fn env_opt(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn env_timeout(var: &str) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

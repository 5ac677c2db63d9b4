//! # Service Configuration
//!
//! Environment-driven settings for the HTTP service. Collaborator
//! connection settings live with their clients in `payaudit-clients`.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PORT` | `8080` |
//! | `PUBLIC_BASE_URL` | `http://localhost:8080` |
//! | `ADMIN_TOKEN` | unset (admin routes unauthenticated) |
//! | `PORTAL_TOKEN_TTL_HOURS` | `48` |
//! | `MAX_UPLOAD_BYTES` | `10485760` |
//! | `AUDIT_PRICE_CENTS` | `29900` |
//! | `AUDIT_CURRENCY` | `usd` |
//! | `EMAIL_FROM` | `Payroll Audit <reports@localhost>` |
//! | `STALLED_AFTER_MINUTES` | `30` |
//! | `METRICS_ENABLED` | `true` |
//! | `LOG_FORMAT` | `text` |

use std::str::FromStr;

use url::Url;

use crate::auth::SecretToken;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected text or json, got {other}")),
        }
    }
}

/// Application configuration.
///
/// Custom `Debug` redacts the admin token.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// `<base>` of portal links and checkout return URLs, without a trailing slash.
    pub public_base_url: String,
    /// Bearer token for `/v1/admin/*`. `None` disables admin auth.
    pub admin_token: Option<SecretToken>,
    pub portal_token_ttl_hours: i64,
    pub max_upload_bytes: usize,
    pub audit_price_cents: i64,
    pub audit_currency: String,
    pub email_from: String,
    pub stalled_after_minutes: i64,
    pub metrics_enabled: bool,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("public_base_url", &self.public_base_url)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field("portal_token_ttl_hours", &self.portal_token_ttl_hours)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("audit_price_cents", &self.audit_price_cents)
            .field("audit_currency", &self.audit_currency)
            .field("email_from", &self.email_from)
            .field("stalled_after_minutes", &self.stalled_after_minutes)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
            admin_token: None,
            portal_token_ttl_hours: 48,
            max_upload_bytes: 10 * 1024 * 1024,
            audit_price_cents: 29_900,
            audit_currency: "usd".to_string(),
            email_from: "Payroll Audit <reports@localhost>".to_string(),
            stalled_after_minutes: 30,
            metrics_enabled: true,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let public_base_url = match env_opt("PUBLIC_BASE_URL") {
            Some(raw) => Url::parse(&raw)
                .map_err(|e| ConfigError::Invalid {
                    var: "PUBLIC_BASE_URL",
                    value: raw.clone(),
                    reason: e.to_string(),
                })?
                .as_str()
                .trim_end_matches('/')
                .to_string(),
            None => defaults.public_base_url,
        };
        let audit_currency = env_opt("AUDIT_CURRENCY")
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or(defaults.audit_currency);
        if audit_currency.len() != 3 || !audit_currency.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid {
                var: "AUDIT_CURRENCY",
                value: audit_currency,
                reason: "expected a three-letter ISO currency code".into(),
            });
        }

        let config = Self {
            port: env_parse("PORT", defaults.port)?,
            public_base_url,
            admin_token: env_opt("ADMIN_TOKEN").map(SecretToken::new),
            portal_token_ttl_hours: env_parse("PORTAL_TOKEN_TTL_HOURS", defaults.portal_token_ttl_hours)?,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            audit_price_cents: env_parse("AUDIT_PRICE_CENTS", defaults.audit_price_cents)?,
            audit_currency,
            email_from: env_opt("EMAIL_FROM").unwrap_or(defaults.email_from),
            stalled_after_minutes: env_parse("STALLED_AFTER_MINUTES", defaults.stalled_after_minutes)?,
            metrics_enabled: env_parse("METRICS_ENABLED", defaults.metrics_enabled)?,
            log_format: env_parse("LOG_FORMAT", defaults.log_format)?,
        };
        config.check_positive()?;
        Ok(config)
    }

    fn check_positive(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, i64); 3] = [
            ("PORTAL_TOKEN_TTL_HOURS", self.portal_token_ttl_hours),
            ("AUDIT_PRICE_CENTS", self.audit_price_cents),
            ("STALLED_AFTER_MINUTES", self.stalled_after_minutes),
        ];
        for (var, value) in checks {
            if value <= 0 {
                return Err(ConfigError::Invalid {
                    var,
                    value: value.to_string(),
                    reason: "must be positive".into(),
                });
            }
        }
        Ok(())
    }

    /// Lifetime of a freshly issued portal token.
    pub fn portal_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.portal_token_ttl_hours)
    }

    /// Age after which an unfinished analysis is considered stalled.
    pub fn stalled_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stalled_after_minutes)
    }

    /// Absolute URL under the public base.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn env_opt(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.portal_token_ttl_hours, 48);
        assert_eq!(cfg.max_upload_bytes, 10_485_760);
        assert_eq!(cfg.audit_currency, "usd");
        assert!(cfg.admin_token.is_none());
    }

    #[test]
    fn public_url_joins_cleanly() {
        let mut cfg = AppConfig::default();
        cfg.public_base_url = "https://audit.example.com/".to_string();
        assert_eq!(
            cfg.public_url("/portal/access"),
            "https://audit.example.com/portal/access"
        );
    }

    #[test]
    fn env_parse_reports_variable_name() {
        std::env::set_var("PAYAUDIT_TEST_PORT_BAD", "eighty");
        let err = env_parse::<u16>("PAYAUDIT_TEST_PORT_BAD", 1).unwrap_err();
        std::env::remove_var("PAYAUDIT_TEST_PORT_BAD");
        assert!(err.to_string().contains("PAYAUDIT_TEST_PORT_BAD"));
    }

    #[test]
    fn debug_redacts_admin_token() {
        let cfg = AppConfig {
            admin_token: Some(SecretToken::new("super-secret-admin".to_string())),
            ..AppConfig::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("super-secret-admin"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}

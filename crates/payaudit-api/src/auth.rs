//! # Admin Authentication Middleware
//!
//! Bearer token check for the operator surface (`/v1/admin/*`). There are
//! no roles: a caller holding the admin token may run every recovery
//! operation.
//!
//! When no token is configured the middleware lets requests through. The
//! binary logs a warning at startup in that case.

use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::AppError;

// ── Secret Token ────────────────────────────────────────────────────────────

/// A secret bearer token. Zeroized on drop; `Debug` never prints the value.
#[derive(Clone)]
pub struct SecretToken(Zeroizing<String>);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretToken([REDACTED])")
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<SecretToken>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer tokens.
///
/// When lengths differ, performs a dummy comparison so that timing does not
/// depend on where the mismatch is.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Middleware enforcing the admin bearer token, if one is configured.
pub async fn admin_auth_middleware(request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|cfg| cfg.token.clone());

    let Some(expected) = expected else {
        return next.run(request).await;
    };

    match bearer(&request) {
        Some(provided) if constant_time_token_eq(provided, expected.expose()) => {
            next.run(request).await
        }
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "admin request with invalid bearer token");
            AppError::Unauthorized("invalid bearer token".into()).into_response()
        }
        None => AppError::Unauthorized("missing bearer token".into()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_eq_matches_identical() {
        assert!(constant_time_token_eq("abc123", "abc123"));
    }

    #[test]
    fn token_eq_rejects_different_length_and_content() {
        assert!(!constant_time_token_eq("abc", "abcd"));
        assert!(!constant_time_token_eq("abc124", "abc123"));
    }

    #[test]
    fn secret_token_debug_is_redacted() {
        let t = SecretToken::new("hunter2");
        assert!(!format!("{t:?}").contains("hunter2"));
        assert_eq!(t.expose(), "hunter2");
    }
}

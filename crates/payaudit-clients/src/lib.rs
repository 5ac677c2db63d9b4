//! # payaudit-clients -- Typed clients for external collaborators
//!
//! The portal depends on three services it does not own:
//!
//! - **Payment processor**: hosted checkout sessions, server-side session
//!   retrieval ([`PaymentProcessor`]).
//! - **Email provider**: transactional send ([`EmailProvider`]).
//! - **Analysis engine**: turns an uploaded payroll dataset into a report
//!   ([`AnalysisEngine`]).
//!
//! Each collaborator is a trait so the API crate can hold `Arc<dyn _>` and
//! tests can swap in the in-process implementations from [`mock`]. The HTTP
//! implementations share one error type, one retry policy, and env-driven
//! configuration.
//!
//! ## Architecture
//!
//! This crate is the only place that speaks HTTP to collaborators. It
//! depends on `payaudit-core` for identifier newtypes and nothing else
//! internal.

pub mod analysis;
pub mod config;
pub mod email;
pub mod error;
pub mod mock;
pub mod payment;
pub(crate) mod retry;

pub use analysis::{AnalysisEngine, AnalysisInput, AnalysisOutput, HttpAnalysisEngine};
pub use config::{AnalysisConfig, ConfigError, EmailConfig, PaymentConfig};
pub use email::{EmailMessage, EmailProvider, HttpEmailProvider};
pub use error::ClientError;
pub use payment::{
    CheckoutRequest, CheckoutSession, HttpPaymentProcessor, PaymentProcessor, SessionPaymentStatus,
};

use std::time::Duration;

/// Build the shared reqwest client for one collaborator.
///
/// A bearer `Authorization` header is attached when `api_key` is set.
pub(crate) fn build_http(
    collaborator: &'static str,
    api_key: Option<&str>,
    timeout_secs: u64,
) -> Result<reqwest::Client, ClientError> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(key) = api_key {
        let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| ClientError::Config(ConfigError::InvalidCredential(collaborator)))?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| ClientError::Http {
            endpoint: format!("{collaborator} client_init"),
            source: e,
        })
}

/// Map a non-2xx response into [`ClientError::ApiError`].
pub(crate) async fn ensure_success(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::ApiError {
        endpoint: endpoint.to_string(),
        status,
        body,
    })
}

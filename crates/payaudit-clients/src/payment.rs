//! Typed client for the payment processor's hosted checkout.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/v1/checkout/sessions` | Create checkout session |
//! | GET    | `/v1/checkout/sessions/{id}` | Retrieve session |
//!
//! The portal never trusts a client-supplied "paid" flag. A payment is only
//! applied after [`PaymentProcessor::retrieve_session`] reports it paid and
//! the session's `metadata.request_id` matches the request being confirmed.

use std::collections::HashMap;

use async_trait::async_trait;
use payaudit_core::RequestId;
use serde::{Deserialize, Serialize};

use crate::config::PaymentConfig;
use crate::error::ClientError;

/// Metadata key carrying the audit request correlator.
pub const REQUEST_ID_METADATA_KEY: &str = "request_id";

// -- Types --------------------------------------------------------------------

/// Request to open a hosted checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub amount: i64,
    pub currency: String,
    pub product_name: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

impl CheckoutRequest {
    /// The request id this checkout is for, if present in metadata.
    pub fn request_id(&self) -> Option<&str> {
        self.metadata.get(REQUEST_ID_METADATA_KEY).map(String::as_str)
    }
}

/// Payment state of a checkout session as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    /// Forward-compatible catch-all.
    #[serde(other)]
    Unknown,
}

/// A checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted checkout page. Absent on retrieved, completed sessions.
    #[serde(default)]
    pub url: Option<String>,
    pub payment_status: SessionPaymentStatus,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// The correlated request id, if metadata carries a parseable one.
    pub fn request_id(&self) -> Option<RequestId> {
        self.metadata
            .get(REQUEST_ID_METADATA_KEY)
            .and_then(|raw| raw.parse().ok())
    }

    /// Whether the processor reports the session as paid.
    pub fn is_paid(&self) -> bool {
        self.payment_status == SessionPaymentStatus::Paid
    }
}

// -- Trait --------------------------------------------------------------------

/// Payment processor operations the portal relies on.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Open a hosted checkout session.
    async fn create_checkout_session(
        &self,
        req: &CheckoutRequest,
    ) -> Result<CheckoutSession, ClientError>;

    /// Fetch a session by id. `Ok(None)` if the processor does not know it.
    async fn retrieve_session(&self, session_id: &str)
        -> Result<Option<CheckoutSession>, ClientError>;
}

// -- HTTP client --------------------------------------------------------------

/// HTTP implementation of [`PaymentProcessor`].
#[derive(Debug, Clone)]
pub struct HttpPaymentProcessor {
    http: reqwest::Client,
    base_url: url::Url,
}

impl HttpPaymentProcessor {
    pub fn new(config: &PaymentConfig) -> Result<Self, ClientError> {
        let http = crate::build_http(
            "payment processor",
            Some(config.api_key.as_str()),
            config.timeout_secs,
        )?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    /// Calls `POST {base_url}/v1/checkout/sessions`. Not retried.
    async fn create_checkout_session(
        &self,
        req: &CheckoutRequest,
    ) -> Result<CheckoutSession, ClientError> {
        let endpoint = "POST /v1/checkout/sessions";
        let url = self.url("/v1/checkout/sessions");

        let resp = self
            .http
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| ClientError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;
        let resp = crate::ensure_success(endpoint, resp).await?;

        let session: CheckoutSession =
            resp.json().await.map_err(|e| ClientError::Deserialization {
                endpoint: endpoint.into(),
                source: e,
            })?;
        if session.url.is_none() {
            return Err(ClientError::Rejected {
                endpoint: endpoint.into(),
                reason: "session has no checkout url".into(),
            });
        }
        Ok(session)
    }

    /// Calls `GET {base_url}/v1/checkout/sessions/{id}`.
    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, ClientError> {
        let endpoint = format!("GET /v1/checkout/sessions/{session_id}");
        let url = self.url(&format!("/v1/checkout/sessions/{session_id}"));

        let resp = crate::retry::get_with_retry(&self.http, &endpoint, &url).await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = crate::ensure_success(&endpoint, resp).await?;

        resp.json()
            .await
            .map(Some)
            .map_err(|e| ClientError::Deserialization {
                endpoint,
                source: e,
            })
    }
}

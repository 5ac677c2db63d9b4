//! Typed client for the transactional email provider.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/emails` | Send one message |
//!
//! `send` resolves to `Ok(true)` only when the provider acknowledges the
//! message with an id. Callers treat `Ok(false)` and `Err(_)` alike as a
//! failed send.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;
use crate::error::ClientError;

/// A rendered message ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Email provider operations the portal relies on.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send a message. `Ok(true)` means the provider accepted it.
    async fn send(&self, message: &EmailMessage) -> Result<bool, ClientError>;
}

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    #[serde(default)]
    id: Option<String>,
}

/// HTTP implementation of [`EmailProvider`].
#[derive(Debug, Clone)]
pub struct HttpEmailProvider {
    http: reqwest::Client,
    base_url: url::Url,
}

impl HttpEmailProvider {
    pub fn new(config: &EmailConfig) -> Result<Self, ClientError> {
        let http = crate::build_http(
            "email provider",
            Some(config.api_key.as_str()),
            config.timeout_secs,
        )?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    /// Calls `POST {base_url}/emails`. Not retried, to avoid duplicate sends.
    async fn send(&self, message: &EmailMessage) -> Result<bool, ClientError> {
        let endpoint = "POST /emails";
        let url = format!("{}/emails", self.base_url.as_str().trim_end_matches('/'));
        let body = SendEmailBody {
            from: &message.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;
        let resp = crate::ensure_success(endpoint, resp).await?;

        let ack: SendEmailResponse =
            resp.json().await.map_err(|e| ClientError::Deserialization {
                endpoint: endpoint.into(),
                source: e,
            })?;
        let accepted = ack.id.is_some_and(|id| !id.is_empty());
        if !accepted {
            tracing::warn!(to = %message.to, "email provider returned no message id");
        }
        Ok(accepted)
    }
}

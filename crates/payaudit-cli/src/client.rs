//! # Admin API Client
//!
//! Thin reqwest wrapper over `/v1/admin/*`. Responses are kept as JSON
//! values; the command modules pick out the fields they print.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;
use zeroize::Zeroizing;

const TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for the admin API.
pub struct AdminClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl AdminClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid service URL {base_url:?}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .user_agent(concat!("payaudit-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()).map(Zeroizing::new),
        })
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        self.send(Method::POST, path, body).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid path {path:?}"))?;
        tracing::debug!(%method, %url, "admin request");

        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.as_str());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("{method} {url} failed"))?;

        let status = response.status();
        let text = response.text().await.context("reading response body")?;
        if !status.is_success() {
            bail!(describe_failure(status, &text));
        }
        serde_json::from_str(&text).with_context(|| format!("{method} {url} returned invalid JSON"))
    }
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!(
            "{} ({}): {}",
            envelope.error.code, status, envelope.error.message
        ),
        Err(_) if status == StatusCode::UNAUTHORIZED => {
            format!("{status}: set PAYAUDIT_ADMIN_TOKEN or pass --token")
        }
        Err(_) => format!("{status}: {}", body.trim()),
    }
}

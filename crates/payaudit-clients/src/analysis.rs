//! Typed client for the payroll analysis engine.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/v1/analyze` | Analyse one dataset |
//!
//! The engine is opaque: it receives the stored dataset and returns a report
//! identifier plus an arbitrary JSON report payload.

use async_trait::async_trait;
use payaudit_core::{ReportId, RequestId};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::ClientError;

/// Dataset handed to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisInput {
    pub request_id: RequestId,
    pub company_name: String,
    pub columns: Vec<String>,
    pub row_count: u64,
    pub csv_data: String,
}

/// Engine output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub report_id: ReportId,
    #[serde(alias = "report_data")]
    pub report: serde_json::Value,
}

/// Analysis engine operations.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Analyse a dataset and return the generated report.
    async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisOutput, ClientError>;
}

/// HTTP implementation of [`AnalysisEngine`].
#[derive(Debug, Clone)]
pub struct HttpAnalysisEngine {
    http: reqwest::Client,
    base_url: url::Url,
}

impl HttpAnalysisEngine {
    pub fn new(config: &AnalysisConfig) -> Result<Self, ClientError> {
        let key = config.api_key.as_ref().map(|k| k.as_str());
        let http = crate::build_http("analysis engine", key, config.timeout_secs)?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl AnalysisEngine for HttpAnalysisEngine {
    /// Calls `POST {base_url}/v1/analyze` once. A timeout is an error, not a
    /// retry: the engine may still be working on the first submission.
    async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisOutput, ClientError> {
        let endpoint = "POST /v1/analyze";
        let url = format!("{}/v1/analyze", self.base_url.as_str().trim_end_matches('/'));

        let resp = self
            .http
            .post(&url)
            .json(input)
            .send()
            .await
            .map_err(|e| ClientError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;
        let resp = crate::ensure_success(endpoint, resp).await?;

        resp.json().await.map_err(|e| ClientError::Deserialization {
            endpoint: endpoint.into(),
            source: e,
        })
    }
}

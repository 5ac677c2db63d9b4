//! # Prometheus Metrics
//!
//! Request metrics and lifecycle counters through the `metrics` facade.
//! Without an installed recorder every call here is a no-op, so services
//! record unconditionally and tests need no setup.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return its render handle.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Middleware recording a request counter and latency histogram.
///
/// Labelled by matched route template, so `/v1/requests/{id}/status` is one
/// series regardless of id.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        "payaudit_http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "payaudit_http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

// -- Lifecycle counters -------------------------------------------------------

pub fn token_issued() {
    metrics::counter!("payaudit_tokens_issued_total").increment(1);
}

/// `outcome`: `consumed`, `not_found`, `expired`, `already_used`.
pub fn token_consumed(outcome: &'static str) {
    metrics::counter!("payaudit_tokens_consumed_total", "outcome" => outcome).increment(1);
}

pub fn payment_confirmed() {
    metrics::counter!("payaudit_payments_confirmed_total").increment(1);
}

/// `outcome`: `accepted`, `rejected`, `payment_required`.
pub fn upload(outcome: &'static str) {
    metrics::counter!("payaudit_uploads_total", "outcome" => outcome).increment(1);
}

/// `outcome`: `reported`, `failed`, `skipped`.
pub fn analysis_job(outcome: &'static str) {
    metrics::counter!("payaudit_analysis_jobs_total", "outcome" => outcome).increment(1);
}

/// `outcome`: `delivered`, `failed`.
pub fn delivery(outcome: &'static str) {
    metrics::counter!("payaudit_deliveries_total", "outcome" => outcome).increment(1);
}

//! Bounded retry for idempotent collaborator reads.
//!
//! Only `GET`s go through here (session retrieval). Checkout creation, email
//! send and analysis are sent once: a request that timed out may still have
//! been processed upstream, and replaying it would bill or mail twice.
//!
//! A read is retried on transport errors and on 429 / 502 / 503 / 504. A
//! `Retry-After` given in seconds replaces the computed backoff, capped at
//! [`MAX_DELAY`]. After the last attempt the response is returned as-is so
//! the caller maps the status through [`crate::ensure_success`].

use std::time::Duration;

use reqwest::{header, Response, StatusCode};

use crate::error::ClientError;

/// Retries after the first attempt.
const MAX_RETRIES: u32 = 3;

/// First backoff; doubles per attempt.
const BASE_DELAY: Duration = Duration::from_millis(200);

/// Upper bound for any single wait, including server-requested ones.
const MAX_DELAY: Duration = Duration::from_secs(5);

fn retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn backoff(attempt: u32) -> Duration {
    BASE_DELAY.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_DELAY)
}

fn retry_after(resp: &Response) -> Option<Duration> {
    let secs = resp
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    Some(Duration::from_secs(secs).min(MAX_DELAY))
}

/// `GET url`, retrying transient failures.
pub(crate) async fn get_with_retry(
    http: &reqwest::Client,
    endpoint: &str,
    url: &str,
) -> Result<Response, ClientError> {
    let mut attempt = 0;
    loop {
        let last = attempt == MAX_RETRIES;
        match http.get(url).send().await {
            Ok(resp) if !last && retryable_status(resp.status()) => {
                let delay = retry_after(&resp).unwrap_or_else(|| backoff(attempt));
                tracing::warn!(
                    endpoint,
                    status = resp.status().as_u16(),
                    attempt = attempt + 1,
                    "collaborator busy, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(resp) => return Ok(resp),
            Err(e) if !last => {
                let delay = backoff(attempt);
                tracing::warn!(
                    endpoint,
                    attempt = attempt + 1,
                    error = %e,
                    "collaborator unreachable, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(ClientError::Http {
                    endpoint: endpoint.to_string(),
                    source: e,
                })
            }
        }
        attempt += 1;
    }
}

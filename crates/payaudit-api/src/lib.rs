//! # payaudit-api -- Payroll Audit Portal Service
//!
//! Axum service that takes a customer from a single-use portal link
//! through payment, payroll upload, background analysis and report
//! delivery, with operator endpoints for the requests that fall between
//! those steps.
//!
//! ## API Surface
//!
//! | Prefix                 | Module                 | Audience  |
//! |------------------------|------------------------|-----------|
//! | `/v1/portal/*`, `/portal/access` | [`routes::portal`] | Customer |
//! | `/v1/payments/*`       | [`routes::payments`]   | Customer, processor |
//! | `/v1/requests/*`       | [`routes::requests`]   | Customer  |
//! | `/v1/admin/*`          | [`routes::admin`]      | Operator (bearer token) |
//! | `/health/*`, `/metrics`| this module            | Infrastructure |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → [AdminAuth on /v1/admin/*] → Handler
//! ```
//!
//! ## Crate Policy
//!
//! - Handlers parse and map errors; lifecycle rules live in `payaudit-state`
//!   and orchestration in [`services`].
//! - All errors map to structured HTTP responses via [`AppError`].

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;

pub use config::AppConfig;
pub use error::AppError;
pub use state::{AppState, Collaborators};

/// Assemble the full application router with all routes and middleware.
///
/// Only `/v1/admin/*` requires the bearer token; customer routes are
/// authorised by the portal token or the request id they carry.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.admin_token.clone(),
    };
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(render_metrics))
        .merge(routes::portal::router())
        .merge(routes::payments::router())
        .merge(routes::requests::router(max_upload_bytes))
        .merge(routes::admin::router())
        .merge(openapi::router())
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state)
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 when the request store answers.
async fn readiness(State(state): State<AppState>) -> Response {
    match state.repo.ping().await {
        Ok(()) => "ready".into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "request store unavailable").into_response()
        }
    }
}

/// GET /metrics: Prometheus text exposition, 404 when metrics are disabled.
async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

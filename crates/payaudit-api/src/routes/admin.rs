//! # Operator API
//!
//! Recovery scans and repairs, mounted under `/v1/admin` behind the bearer
//! token middleware. Every repair is idempotent and safe to re-run.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use payaudit_core::RequestId;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::admin_auth_middleware;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_blank, Validate};
use crate::services::load;
use crate::services::recovery::{
    self, EmailCorrected, EmailSearchHit, MissingReport, MissingReportsReconciled,
    RequestSummary, ResendResult,
};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CorrectEmailRequest {
    pub email: String,
}

impl Validate for CorrectEmailRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("email", &self.email)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmailSearchQuery {
    pub email: String,
    /// Also match shared local parts and near-miss addresses.
    #[serde(default)]
    pub fuzzy: bool,
}

/// Build the operator router. Every route requires the admin token.
pub fn router() -> Router<AppState> {
    let routes = Router::new()
        .route("/requests/without-report", get(list_without_report))
        .route("/requests/undelivered", get(list_undelivered))
        .route("/requests/search", get(search))
        .route("/requests/{id}", get(get_request))
        .route("/requests/{id}/resend", post(resend))
        .route("/requests/{id}/correct-email", post(correct_email))
        .route("/reconcile/missing-reports", post(reconcile_missing))
        .route("/reconcile/undelivered", post(reconcile_undelivered))
        .route_layer(from_fn(admin_auth_middleware));
    Router::new().nest("/v1/admin", routes)
}

/// GET /v1/admin/requests/without-report: Paid requests with no report.
#[utoipa::path(
    get,
    path = "/v1/admin/requests/without-report",
    responses(
        (status = 200, description = "Classified paid requests", body = Vec<MissingReport>),
        (status = 401, description = "Missing or invalid admin token", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn list_without_report(
    State(state): State<AppState>,
) -> Result<Json<Vec<MissingReport>>, AppError> {
    Ok(Json(recovery::scan_paid_without_report(&state, Utc::now()).await?))
}

/// POST /v1/admin/reconcile/missing-reports: Re-queue failed and stalled analyses.
#[utoipa::path(
    post,
    path = "/v1/admin/reconcile/missing-reports",
    responses(
        (status = 200, description = "Reconciliation outcome", body = MissingReportsReconciled),
        (status = 401, description = "Missing or invalid admin token", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn reconcile_missing(
    State(state): State<AppState>,
) -> Result<Json<MissingReportsReconciled>, AppError> {
    Ok(Json(recovery::reconcile_missing_reports(&state, Utc::now()).await?))
}

/// GET /v1/admin/requests/undelivered: Reports that never reached the customer.
#[utoipa::path(
    get,
    path = "/v1/admin/requests/undelivered",
    responses(
        (status = 200, description = "Undelivered requests", body = Vec<RequestSummary>),
        (status = 401, description = "Missing or invalid admin token", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn list_undelivered(
    State(state): State<AppState>,
) -> Result<Json<Vec<RequestSummary>>, AppError> {
    Ok(Json(recovery::scan_undelivered(&state).await?))
}

/// POST /v1/admin/reconcile/undelivered: Resend every undelivered report.
#[utoipa::path(
    post,
    path = "/v1/admin/reconcile/undelivered",
    responses(
        (status = 200, description = "One result per attempted resend", body = Vec<ResendResult>),
        (status = 401, description = "Missing or invalid admin token", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn reconcile_undelivered(
    State(state): State<AppState>,
) -> Result<Json<Vec<ResendResult>>, AppError> {
    Ok(Json(recovery::reconcile_undelivered(&state).await?))
}

/// POST /v1/admin/requests/{id}/resend: Resend one report.
#[utoipa::path(
    post,
    path = "/v1/admin/requests/{id}/resend",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Resend attempted", body = ResendResult),
        (status = 404, description = "Request not found", body = crate::error::ErrorBody),
        (status = 409, description = "No report to send", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn resend(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResendResult>, AppError> {
    Ok(Json(recovery::resend(&state, RequestId::from_uuid(id)).await?))
}

/// POST /v1/admin/requests/{id}/correct-email: Fix the address and resend.
#[utoipa::path(
    post,
    path = "/v1/admin/requests/{id}/correct-email",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = CorrectEmailRequest,
    responses(
        (status = 200, description = "Address corrected", body = EmailCorrected),
        (status = 404, description = "Request not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid address", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn correct_email(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<CorrectEmailRequest>, JsonRejection>,
) -> Result<Json<EmailCorrected>, AppError> {
    let req = extract_validated_json(body)?;
    let corrected =
        recovery::correct_email_and_resend(&state, RequestId::from_uuid(id), &req.email).await?;
    Ok(Json(corrected))
}

/// GET /v1/admin/requests/search: Find requests by customer address.
#[utoipa::path(
    get,
    path = "/v1/admin/requests/search",
    params(EmailSearchQuery),
    responses(
        (status = 200, description = "Matches, exact first", body = Vec<EmailSearchHit>),
        (status = 422, description = "Invalid address", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn search(
    State(state): State<AppState>,
    Query(query): Query<EmailSearchQuery>,
) -> Result<Json<Vec<EmailSearchHit>>, AppError> {
    Ok(Json(
        recovery::find_by_email(&state, &query.email, query.fuzzy).await?,
    ))
}

/// GET /v1/admin/requests/{id}: Operator view of one request.
#[utoipa::path(
    get,
    path = "/v1/admin/requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request found", body = RequestSummary),
        (status = 404, description = "Request not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RequestSummary>, AppError> {
    let request = load(&state, RequestId::from_uuid(id)).await?;
    Ok(Json(RequestSummary::from(&request)))
}

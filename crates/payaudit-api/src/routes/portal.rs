//! # Portal API
//!
//! The customer entry points: requesting a portal link and redeeming it.
//! Redeeming consumes the token; a pending request is sent on to checkout,
//! a paid one to the upload page.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use payaudit_core::RequestId;
use payaudit_state::AuditStatus;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_blank, Validate};
use crate::services::payment;
use crate::services::tokens::{self, AccessRequest, AccessResponse};
use crate::state::AppState;

impl Validate for AccessRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("company_name", &self.company_name)?;
        require_non_blank("contact_name", &self.contact_name)?;
        require_non_blank("email", &self.email)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccessQuery {
    /// Raw portal token from the emailed link.
    pub token: Option<String>,
}

/// Where a redeemed link leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    Checkout,
    Upload,
    Status,
}

/// JSON form of a redeemed link, for `Accept: application/json` clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessGranted {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub status: String,
    pub next: NextStep,
    pub redirect_url: String,
}

/// Build the portal router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/portal/request", post(request_access))
        .route("/portal/access", get(redeem_link))
}

/// POST /v1/portal/request: Email a fresh single-use portal link.
#[utoipa::path(
    post,
    path = "/v1/portal/request",
    request_body = AccessRequest,
    responses(
        (status = 202, description = "Link issued", body = AccessResponse),
        (status = 422, description = "Invalid input", body = crate::error::ErrorBody),
    ),
    tag = "portal"
)]
async fn request_access(
    State(state): State<AppState>,
    body: Result<Json<AccessRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AccessResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let resp = tokens::request_access(&state, req, Utc::now()).await?;
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

/// GET /portal/access: Redeem a portal link.
#[utoipa::path(
    get,
    path = "/portal/access",
    params(AccessQuery),
    responses(
        (status = 303, description = "Redirect to checkout or upload"),
        (status = 200, description = "Redeemed (JSON clients)", body = AccessGranted),
        (status = 404, description = "Unknown link", body = crate::error::ErrorBody),
        (status = 409, description = "Link already used", body = crate::error::ErrorBody),
        (status = 410, description = "Link expired", body = crate::error::ErrorBody),
    ),
    tag = "portal"
)]
async fn redeem_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AccessQuery>,
) -> Result<Response, AppError> {
    let raw = query
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Validation("token query parameter is required".into()))?;
    let now = Utc::now();
    let request = tokens::validate_and_consume(&state, &raw, now).await?;

    let (next, redirect_url) = match request.status {
        AuditStatus::Pending => {
            let checkout = payment::start_checkout(&state, &request, now)
                .await
                .map_err(|e| {
                    tracing::error!(request_id = %request.id, error = %e, "checkout creation failed after token use");
                    e
                })?;
            (NextStep::Checkout, checkout.checkout_url)
        }
        AuditStatus::Paid | AuditStatus::Failed if request.report.is_none() => (
            NextStep::Upload,
            format!(
                "{}?request_id={}",
                state.config.public_url("/portal/upload"),
                request.id
            ),
        ),
        _ => (
            NextStep::Status,
            format!(
                "{}?request_id={}",
                state.config.public_url("/portal/status"),
                request.id
            ),
        ),
    };

    if wants_json(&headers) {
        return Ok(Json(AccessGranted {
            request_id: request.id,
            status: request.status.as_str().to_string(),
            next,
            redirect_url,
        })
        .into_response());
    }
    Ok(Redirect::to(&redirect_url).into_response())
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

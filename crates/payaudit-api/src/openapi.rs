//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec.
//! Serves at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll Audit Portal API",
        version = "0.1.0",
        description = "Portal links, payment gate, payroll upload, asynchronous analysis, report delivery, and operator reconciliation.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Portal
        crate::routes::portal::request_access,
        crate::routes::portal::redeem_link,
        // Payments
        crate::routes::payments::confirm,
        crate::routes::payments::webhook,
        // Requests
        crate::routes::requests::upload,
        crate::routes::requests::status,
        // Admin
        crate::routes::admin::list_without_report,
        crate::routes::admin::reconcile_missing,
        crate::routes::admin::list_undelivered,
        crate::routes::admin::reconcile_undelivered,
        crate::routes::admin::resend,
        crate::routes::admin::correct_email,
        crate::routes::admin::search,
        crate::routes::admin::get_request,
    ),
    components(schemas(
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::services::UploadIssue,
        // Portal DTOs
        crate::services::tokens::AccessRequest,
        crate::services::tokens::AccessResponse,
        crate::routes::portal::AccessGranted,
        crate::routes::portal::NextStep,
        // Payment DTOs
        crate::routes::payments::ConfirmPaymentRequest,
        crate::routes::payments::WebhookEvent,
        crate::routes::payments::WebhookData,
        crate::routes::payments::WebhookAck,
        crate::services::payment::PaymentConfirmed,
        // Request DTOs
        crate::services::ingestion::UploadAccepted,
        crate::routes::requests::CustomerStatus,
        crate::routes::requests::Stage,
        // Admin DTOs
        crate::services::recovery::RequestSummary,
        crate::services::recovery::MissingReport,
        crate::services::recovery::MissingReportReason,
        crate::services::recovery::MissingReportsReconciled,
        crate::services::recovery::ReconcileFailure,
        crate::services::recovery::ResendResult,
        crate::services::recovery::EmailCorrected,
        crate::services::recovery::EmailSearchHit,
        crate::routes::admin::CorrectEmailRequest,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "portal", description = "Portal link issuance and redemption"),
        (name = "payments", description = "Checkout confirmation"),
        (name = "requests", description = "Payroll upload and customer status"),
        (name = "admin", description = "Operator recovery and reconciliation"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by the admin routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

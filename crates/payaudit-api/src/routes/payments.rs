//! # Payment Confirmation API
//!
//! Two ways to tell the service a checkout finished: the customer's success
//! redirect and the processor's webhook. Neither body is trusted; both
//! only name a session, which is re-fetched from the processor.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use payaudit_core::RequestId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, require_non_blank, Validate};
use crate::services::payment::{self, PaymentConfirmed};
use crate::state::AppState;

/// Webhook event types that mean a session has been paid.
const PAID_EVENTS: [&str; 2] = [
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
];

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub session_id: String,
}

impl Validate for ConfirmPaymentRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("session_id", &self.session_id)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookData {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    /// Present when the event confirmed a payment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<PaymentConfirmed>,
}

/// Build the payments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/confirm", post(confirm))
        .route("/v1/payments/webhook", post(webhook))
}

/// POST /v1/payments/confirm: Confirm payment after the checkout redirect.
#[utoipa::path(
    post,
    path = "/v1/payments/confirm",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed", body = PaymentConfirmed),
        (status = 402, description = "Session not paid", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown request or session", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
async fn confirm(
    State(state): State<AppState>,
    body: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentConfirmed>, AppError> {
    let req = extract_validated_json(body)?;
    let confirmed =
        payment::confirm_payment(&state, req.request_id, req.session_id.trim(), Utc::now()).await?;
    Ok(Json(confirmed))
}

/// POST /v1/payments/webhook: Processor notification.
///
/// Unrelated event types are acknowledged and ignored so the processor
/// does not retry them.
#[utoipa::path(
    post,
    path = "/v1/payments/webhook",
    request_body = WebhookEvent,
    responses(
        (status = 200, description = "Event received", body = WebhookAck),
    ),
    tag = "payments"
)]
async fn webhook(
    State(state): State<AppState>,
    body: Result<Json<WebhookEvent>, JsonRejection>,
) -> Result<Json<WebhookAck>, AppError> {
    let event = extract_json(body)?;
    if !PAID_EVENTS.contains(&event.event_type.as_str()) {
        tracing::debug!(event_type = %event.event_type, "ignoring payment webhook");
        return Ok(Json(WebhookAck {
            received: true,
            confirmation: None,
        }));
    }
    let confirmed =
        payment::confirm_from_webhook(&state, event.data.session_id.trim(), Utc::now()).await?;
    Ok(Json(WebhookAck {
        received: true,
        confirmation: Some(confirmed),
    }))
}

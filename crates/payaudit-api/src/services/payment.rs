//! # Payment Gate
//!
//! Opens checkout sessions and confirms payments. A request only moves to
//! `paid` on a session the processor itself reports as paid, re-fetched
//! server-side and correlated through `metadata.request_id`. Clients never
//! get to say "paid".

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use payaudit_clients::payment::REQUEST_ID_METADATA_KEY;
use payaudit_clients::{CheckoutRequest, CheckoutSession, PaymentProcessor};
use payaudit_core::RequestId;
use payaudit_state::{AuditRequest, PaymentConfirmation, PaymentOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{mutate, ServiceError};
use crate::middleware::metrics as telemetry;
use crate::state::AppState;

const PROCESSOR: &str = "payment processor";

/// A checkout the customer should be redirected to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutStarted {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub session_id: String,
    pub checkout_url: String,
}

/// Result of a payment confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentConfirmed {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    /// `paid`, or whatever later status the request has reached.
    pub status: String,
    /// `false` when this confirmation had already been applied.
    pub newly_confirmed: bool,
}

fn processor(state: &AppState) -> Result<&Arc<dyn PaymentProcessor>, ServiceError> {
    state
        .payments
        .as_ref()
        .ok_or(ServiceError::NotConfigured(PROCESSOR))
}

/// Open a hosted checkout for a pending request and remember its session id.
pub async fn start_checkout(
    state: &AppState,
    request: &AuditRequest,
    now: DateTime<Utc>,
) -> Result<CheckoutStarted, ServiceError> {
    let processor = processor(state)?;
    let config = &state.config;
    let success_url = format!(
        "{}?request_id={}&session_id={{CHECKOUT_SESSION_ID}}",
        config.public_url("/portal/success"),
        request.id
    );
    let cancel_url = format!(
        "{}?request_id={}",
        config.public_url("/portal/cancelled"),
        request.id
    );
    let checkout = CheckoutRequest {
        amount: config.audit_price_cents,
        currency: config.audit_currency.clone(),
        product_name: format!("Payroll audit: {}", request.company_name),
        customer_email: request.customer_email.as_str().to_string(),
        success_url,
        cancel_url,
        metadata: HashMap::from([(REQUEST_ID_METADATA_KEY.to_string(), request.id.to_string())]),
    };

    let session = processor
        .create_checkout_session(&checkout)
        .await
        .map_err(|e| ServiceError::external(PROCESSOR, e))?;
    let checkout_url = session.url.clone().ok_or_else(|| {
        ServiceError::Conflict("payment processor returned a session without a checkout url".into())
    })?;

    let session_id = session.id.clone();
    mutate(state, request.id, move |r| r.record_checkout_session(session_id, now)).await?;
    tracing::info!(request_id = %request.id, session_id = %session.id, "checkout session created");

    Ok(CheckoutStarted {
        request_id: request.id,
        session_id: session.id,
        checkout_url,
    })
}

/// Confirm payment for `request_id` using the processor's view of `session_id`.
///
/// Idempotent: confirming an already-paid request succeeds without change.
pub async fn confirm_payment(
    state: &AppState,
    request_id: RequestId,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<PaymentConfirmed, ServiceError> {
    let session = fetch_session(state, session_id).await?;
    if session.request_id() != Some(request_id) {
        tracing::warn!(%request_id, session_id, "checkout session belongs to another request");
        return Err(ServiceError::Validation(
            "checkout session does not belong to this request".into(),
        ));
    }
    apply(state, request_id, &session, now).await
}

/// Confirm payment from a processor webhook, correlating by session metadata.
pub async fn confirm_from_webhook(
    state: &AppState,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<PaymentConfirmed, ServiceError> {
    let session = fetch_session(state, session_id).await?;
    let request_id = session.request_id().ok_or_else(|| {
        ServiceError::Validation("checkout session carries no request id".into())
    })?;
    apply(state, request_id, &session, now).await
}

async fn fetch_session(state: &AppState, session_id: &str) -> Result<CheckoutSession, ServiceError> {
    if session_id.trim().is_empty() {
        return Err(ServiceError::Validation("session_id must not be empty".into()));
    }
    processor(state)?
        .retrieve_session(session_id)
        .await
        .map_err(|e| ServiceError::external(PROCESSOR, e))?
        .ok_or_else(|| ServiceError::NotFound(format!("checkout session {session_id} not found")))
}

async fn apply(
    state: &AppState,
    request_id: RequestId,
    session: &CheckoutSession,
    now: DateTime<Utc>,
) -> Result<PaymentConfirmed, ServiceError> {
    if !session.is_paid() {
        return Err(ServiceError::PaymentRequired(format!(
            "checkout session {} is not paid",
            session.id
        )));
    }
    let confirmation = PaymentConfirmation {
        session_id: session.id.clone(),
        amount_cents: session.amount_total.unwrap_or(state.config.audit_price_cents),
        currency: session
            .currency
            .clone()
            .unwrap_or_else(|| state.config.audit_currency.clone())
            .to_ascii_lowercase(),
    };

    let mut outcome = PaymentOutcome::AlreadyConfirmed;
    let outcome_slot = &mut outcome;
    let request = mutate(state, request_id, move |r| {
        *outcome_slot = r.confirm_payment(&confirmation, now)?;
        Ok(())
    })
    .await?;

    let newly_confirmed = outcome == PaymentOutcome::Confirmed;
    if newly_confirmed {
        telemetry::payment_confirmed();
        tracing::info!(%request_id, session_id = %session.id, "payment confirmed");
    } else {
        tracing::info!(%request_id, "payment confirmation replayed; already paid");
    }
    Ok(PaymentConfirmed {
        request_id,
        status: request.status.as_str().to_string(),
        newly_confirmed,
    })
}

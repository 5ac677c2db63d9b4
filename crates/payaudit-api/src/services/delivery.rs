//! # Delivery Tracker
//!
//! Emails the generated report to the request's current address and records
//! the outcome. Only a provider-confirmed send sets `report_delivered`; a
//! refusal, an error, or a missing provider is recorded as
//! `last_delivery_error` and reported as [`ServiceError::DeliveryFailed`].
//! The report itself is never touched.

use chrono::Utc;
use payaudit_clients::EmailMessage;
use payaudit_core::RequestId;
use payaudit_state::{AuditRequest, LifecycleError};

use super::{load, mutate, report, ServiceError};
use crate::middleware::metrics as telemetry;
use crate::state::AppState;

/// Deliver the report for `id`, holding the request's operation lock.
pub async fn deliver(state: &AppState, id: RequestId) -> Result<AuditRequest, ServiceError> {
    let _guard = state.locks.lock(id).await;
    deliver_locked(state, id).await
}

/// Deliver the report for `id`. Caller must hold the request's lock.
pub(crate) async fn deliver_locked(
    state: &AppState,
    id: RequestId,
) -> Result<AuditRequest, ServiceError> {
    let request = load(state, id).await?;
    let Some(generated) = &request.report else {
        return Err(LifecycleError::ReportMissing.into());
    };

    let message = EmailMessage {
        from: state.config.email_from.clone(),
        to: request.customer_email.as_str().to_string(),
        subject: report::report_subject(&request),
        html: report::render_report_html(&request, generated),
    };

    let sent = match &state.email {
        None => Err("email provider is not configured".to_string()),
        Some(provider) => match provider.send(&message).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("email provider did not accept the message".to_string()),
            Err(e) => Err(e.to_string()),
        },
    };

    match sent {
        Ok(()) => {
            let updated = mutate(state, id, |r| r.record_delivery(Utc::now())).await?;
            telemetry::delivery("delivered");
            tracing::info!(request_id = %id, to = %message.to, "report delivered");
            Ok(updated)
        }
        Err(reason) => {
            tracing::warn!(request_id = %id, to = %message.to, error = %reason, "report delivery failed");
            let recorded = reason.clone();
            mutate(state, id, move |r| r.record_delivery_failure(recorded, Utc::now())).await?;
            telemetry::delivery("failed");
            Err(ServiceError::DeliveryFailed { reason })
        }
    }
}

//! # Recovery and Reconciliation
//!
//! Operator scans and repairs for requests stuck between states. Every
//! operation is idempotent and takes the per-request lock before touching a
//! request, so two operators (or an operator and the worker) cannot
//! interleave on one id.

use chrono::{DateTime, Utc};
use payaudit_core::{EmailAddress, EmailMatch, RequestId};
use payaudit_state::{AuditRequest, AuditStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{delivery, load, mutate, ServiceError};
use crate::state::AppState;

/// Operator view of one request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RequestSummary {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub company_name: String,
    pub contact_name: String,
    pub customer_email: String,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_session_id: Option<String>,
    pub amount_paid_cents: Option<i64>,
    pub has_data: bool,
    pub row_count: Option<u64>,
    pub original_file_name: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_error: Option<String>,
    pub report_id: Option<String>,
    pub report_delivered: bool,
    pub report_delivered_at: Option<DateTime<Utc>>,
    pub last_delivery_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&AuditRequest> for RequestSummary {
    fn from(r: &AuditRequest) -> Self {
        Self {
            request_id: r.id,
            company_name: r.company_name.clone(),
            contact_name: r.contact_name.clone(),
            customer_email: r.customer_email.as_str().to_string(),
            status: r.status.as_str().to_string(),
            paid_at: r.paid_at,
            payment_session_id: r.payment_session_id.clone(),
            amount_paid_cents: r.amount_paid_cents,
            has_data: r.dataset.is_some(),
            row_count: r.dataset.as_ref().map(|d| d.row_count),
            original_file_name: r.dataset.as_ref().map(|d| d.original_file_name.clone()),
            processing_started_at: r.processing_started_at,
            processing_error: r.processing_error.clone(),
            report_id: r.report.as_ref().map(|g| g.report_id.as_str().to_string()),
            report_delivered: r.report_delivered,
            report_delivered_at: r.report_delivered_at,
            last_delivery_error: r.last_delivery_error.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

// -- Paid without report ------------------------------------------------------

/// Why a paid request has no report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MissingReportReason {
    /// No dataset uploaded. Never auto-advanced.
    AwaitingUpload,
    /// Analysis failed or could not be queued.
    Failed,
    /// Processing for longer than the stall threshold with no error recorded.
    Stalled,
    /// Processing, within the stall threshold.
    InProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MissingReport {
    pub reason: MissingReportReason,
    #[serde(flatten)]
    pub request: RequestSummary,
}

/// Classify every paid request that has no report.
pub async fn scan_paid_without_report(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<Vec<MissingReport>, ServiceError> {
    let cutoff = now - state.config.stalled_after();
    Ok(state
        .repo
        .list()
        .await?
        .iter()
        .filter(|r| r.needs_report())
        .map(|r| MissingReport {
            reason: classify(r, cutoff),
            request: RequestSummary::from(r),
        })
        .collect())
}

fn classify(r: &AuditRequest, cutoff: DateTime<Utc>) -> MissingReportReason {
    if r.dataset.is_none() {
        MissingReportReason::AwaitingUpload
    } else if r.status == AuditStatus::Failed || r.processing_error.is_some() {
        MissingReportReason::Failed
    } else if r.is_stalled(cutoff) {
        MissingReportReason::Stalled
    } else {
        MissingReportReason::InProgress
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReconcileFailure {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub error: String,
}

/// Outcome of [`reconcile_missing_reports`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MissingReportsReconciled {
    /// Re-entered into analysis.
    #[schema(value_type = Vec<String>)]
    pub requeued: Vec<RequestId>,
    /// Paid but no data; left for the customer.
    pub awaiting_upload: Vec<RequestSummary>,
    /// Still inside the stall window; the original job may yet finish.
    pub in_progress: Vec<RequestSummary>,
    /// Resolved by the time the lock was acquired (report now exists).
    #[schema(value_type = Vec<String>)]
    pub already_resolved: Vec<RequestId>,
    pub errors: Vec<ReconcileFailure>,
}

/// Re-queue analysis for failed and stalled requests without a report.
///
/// Requests awaiting upload or still inside the stall window are reported
/// back untouched.
pub async fn reconcile_missing_reports(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<MissingReportsReconciled, ServiceError> {
    let mut out = MissingReportsReconciled::default();
    for entry in scan_paid_without_report(state, now).await? {
        let id = entry.request.request_id;
        match entry.reason {
            MissingReportReason::AwaitingUpload => {
                out.awaiting_upload.push(entry.request);
                continue;
            }
            MissingReportReason::InProgress => {
                out.in_progress.push(entry.request);
                continue;
            }
            MissingReportReason::Failed | MissingReportReason::Stalled => {}
        }

        let guard = state.locks.lock(id).await;
        let restarted = mutate(state, id, move |r| r.restart_processing(now)).await;
        drop(guard);

        match restarted {
            Ok(_) => match state.queue.enqueue(id) {
                Ok(()) => {
                    tracing::info!(request_id = %id, reason = ?entry.reason, "analysis re-queued");
                    out.requeued.push(id);
                }
                Err(e) => {
                    let reason = format!("analysis not queued: {e}");
                    let noted = reason.clone();
                    mutate(state, id, move |r| {
                        r.note_processing_error(noted, now);
                        Ok(())
                    })
                    .await?;
                    out.errors.push(ReconcileFailure {
                        request_id: id,
                        error: reason,
                    });
                }
            },
            Err(ServiceError::Conflict(_)) => out.already_resolved.push(id),
            Err(e) => out.errors.push(ReconcileFailure {
                request_id: id,
                error: e.to_string(),
            }),
        }
    }
    tracing::info!(
        requeued = out.requeued.len(),
        awaiting_upload = out.awaiting_upload.len(),
        in_progress = out.in_progress.len(),
        errors = out.errors.len(),
        "missing-report reconciliation finished"
    );
    Ok(out)
}

// -- Undelivered --------------------------------------------------------------

/// Requests with a report that has not been delivered.
pub async fn scan_undelivered(state: &AppState) -> Result<Vec<RequestSummary>, ServiceError> {
    Ok(state
        .repo
        .list()
        .await?
        .iter()
        .filter(|r| r.is_undelivered())
        .map(RequestSummary::from)
        .collect())
}

/// Outcome of one resend.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResendResult {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub email: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Re-send the stored report for `id` to its current address.
pub async fn resend(state: &AppState, id: RequestId) -> Result<ResendResult, ServiceError> {
    let _guard = state.locks.lock(id).await;
    match delivery::deliver_locked(state, id).await {
        Ok(request) => Ok(ResendResult {
            request_id: id,
            email: request.customer_email.as_str().to_string(),
            delivered: true,
            error: None,
        }),
        Err(ServiceError::DeliveryFailed { reason }) => {
            let request = load(state, id).await?;
            Ok(ResendResult {
                request_id: id,
                email: request.customer_email.as_str().to_string(),
                delivered: false,
                error: Some(reason),
            })
        }
        Err(e) => Err(e),
    }
}

/// Re-send every undelivered report.
pub async fn reconcile_undelivered(state: &AppState) -> Result<Vec<ResendResult>, ServiceError> {
    let mut results = Vec::new();
    for summary in scan_undelivered(state).await? {
        let result = match resend(state, summary.request_id).await {
            Ok(result) => result,
            Err(e) => ResendResult {
                request_id: summary.request_id,
                email: summary.customer_email,
                delivered: false,
                error: Some(e.to_string()),
            },
        };
        results.push(result);
    }
    tracing::info!(
        attempted = results.len(),
        delivered = results.iter().filter(|r| r.delivered).count(),
        "undelivered reconciliation finished"
    );
    Ok(results)
}

// -- Email correction ---------------------------------------------------------

/// Outcome of [`correct_email_and_resend`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmailCorrected {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub previous_email: String,
    pub email: String,
    /// Whether a send was attempted (false when no report exists).
    pub resent: bool,
    pub delivered: bool,
    pub message: String,
}

/// Re-target delivery to `new_email` and resend the existing report.
///
/// With no report, the correction is still stored and nothing is sent.
pub async fn correct_email_and_resend(
    state: &AppState,
    id: RequestId,
    new_email: &str,
) -> Result<EmailCorrected, ServiceError> {
    let email =
        EmailAddress::new(new_email).map_err(|e| ServiceError::Validation(e.to_string()))?;
    let _guard = state.locks.lock(id).await;
    let previous = load(state, id).await?;
    let previous_email = previous.customer_email.as_str().to_string();

    let target = email.clone();
    let updated = mutate(state, id, move |r| {
        r.correct_email(target, Utc::now());
        Ok(())
    })
    .await?;
    tracing::info!(request_id = %id, from = %previous_email, to = %email, "customer email corrected");

    if updated.report.is_none() {
        return Ok(EmailCorrected {
            request_id: id,
            previous_email,
            email: email.to_string(),
            resent: false,
            delivered: false,
            message: "email corrected; no report has been generated yet, so nothing was sent"
                .into(),
        });
    }

    let (delivered, message) = match delivery::deliver_locked(state, id).await {
        Ok(_) => (true, format!("report resent to {email}")),
        Err(ServiceError::DeliveryFailed { reason }) => {
            (false, format!("email corrected but delivery failed: {reason}"))
        }
        Err(e) => return Err(e),
    };
    Ok(EmailCorrected {
        request_id: id,
        previous_email,
        email: email.to_string(),
        resent: true,
        delivered,
        message,
    })
}

// -- Search -------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmailSearchHit {
    #[schema(value_type = String)]
    pub match_kind: EmailMatch,
    #[serde(flatten)]
    pub request: RequestSummary,
}

/// Find requests by address. With `fuzzy`, also returns requests whose
/// address shares the local part or is within a small edit distance.
pub async fn find_by_email(
    state: &AppState,
    email: &str,
    fuzzy: bool,
) -> Result<Vec<EmailSearchHit>, ServiceError> {
    let needle = EmailAddress::new(email).map_err(|e| ServiceError::Validation(e.to_string()))?;
    let mut hits: Vec<(EmailMatch, AuditRequest)> = if fuzzy {
        state
            .repo
            .list()
            .await?
            .into_iter()
            .filter_map(|r| needle.match_against(&r.customer_email).map(|m| (m, r)))
            .collect()
    } else {
        state
            .repo
            .find_by_email(&needle)
            .await?
            .into_iter()
            .map(|r| (EmailMatch::Exact, r))
            .collect()
    };
    hits.sort_by(|(ma, a), (mb, b)| ma.cmp(mb).then(b.created_at.cmp(&a.created_at)));
    Ok(hits
        .into_iter()
        .map(|(match_kind, r)| EmailSearchHit {
            match_kind,
            request: RequestSummary::from(&r),
        })
        .collect())
}

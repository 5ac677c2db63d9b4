//! # Audit Request Aggregate
//!
//! One customer's paid analysis job, end to end. Each group of fields has a
//! single owning transition:
//!
//! | Fields | Owner |
//! |--------|-------|
//! | `portal_token_*`, `token_used_at` | [`AuditRequest::issue_token`], [`AuditRequest::consume_token`] |
//! | `paid_at`, `payment_session_id`, `amount_paid_cents`, `currency` | [`AuditRequest::record_checkout_session`], [`AuditRequest::confirm_payment`] |
//! | `dataset`, `processing_*` | [`AuditRequest::record_upload`], [`AuditRequest::restart_processing`], [`AuditRequest::record_analysis_failure`] |
//! | `report` | [`AuditRequest::record_report`] |
//! | `report_delivered*`, `last_delivery_error` | [`AuditRequest::record_delivery`], [`AuditRequest::record_delivery_failure`] |
//! | `customer_email` | [`AuditRequest::correct_email`] |
//!
//! Every method validates first and mutates second. An `Err` return
//! guarantees the aggregate is unchanged.

use chrono::{DateTime, Utc};
use payaudit_core::{EmailAddress, ReportId, RequestId};
use payaudit_crypto::TokenHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::AuditStatus;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A lifecycle transition was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The transition is not an edge of the lifecycle graph.
    #[error("invalid transition {from} -> {to}: {reason}")]
    InvalidTransition {
        /// Current status.
        from: AuditStatus,
        /// Attempted status.
        to: AuditStatus,
        /// Why the edge is not available.
        reason: String,
    },

    /// No confirmed payment exists for the request.
    #[error("payment required before upload (status {status})")]
    PaymentRequired {
        /// Current status.
        status: AuditStatus,
    },

    /// The presented token does not match the request's current token.
    #[error("portal token not recognised")]
    TokenNotFound,

    /// The token's validity window has passed.
    #[error("portal token expired at {expired_at}")]
    TokenExpired {
        /// Expiry instant of the token.
        expired_at: DateTime<Utc>,
    },

    /// The token was already consumed.
    #[error("portal token already used at {used_at}")]
    TokenAlreadyUsed {
        /// When the token was consumed.
        used_at: DateTime<Utc>,
    },

    /// An operation needs a generated report and there is none.
    #[error("no report has been generated for this request")]
    ReportMissing,

    /// A report already exists; the dataset cannot be replaced or re-analysed.
    #[error("report {report_id} already generated")]
    AlreadyReported {
        /// The existing report.
        report_id: ReportId,
    },

    /// An operation needs an uploaded dataset and there is none.
    #[error("no dataset has been uploaded for this request")]
    DatasetMissing,
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// A parsed, validated upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedDataset {
    /// Raw file contents.
    pub csv_data: String,
    /// Number of data rows, excluding the header.
    pub row_count: u64,
    /// Header row.
    pub columns: Vec<String>,
    /// File name as supplied by the client.
    pub original_file_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// When the upload was accepted.
    pub uploaded_at: DateTime<Utc>,
}

/// Output of the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReport {
    /// Engine-assigned identifier.
    pub report_id: ReportId,
    /// Opaque report payload.
    pub data: serde_json::Value,
    /// When the report was recorded.
    pub generated_at: DateTime<Utc>,
}

/// A server-verified payment, as reported by the payment processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// Processor checkout session.
    pub session_id: String,
    /// Amount actually charged, in minor units.
    pub amount_cents: i64,
    /// ISO currency code, lowercase.
    pub currency: String,
}

/// Result of [`AuditRequest::confirm_payment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// `PENDING → PAID` happened on this call.
    Confirmed,
    /// Payment was already recorded; nothing changed.
    AlreadyConfirmed,
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// The audit request aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRequest {
    pub id: RequestId,
    pub company_name: String,
    pub contact_name: String,
    pub customer_email: EmailAddress,
    pub status: AuditStatus,

    pub portal_token_hash: Option<TokenHash>,
    pub portal_token_expires_at: Option<DateTime<Utc>>,
    pub token_used_at: Option<DateTime<Utc>>,

    pub payment_session_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub amount_paid_cents: Option<i64>,
    pub currency: Option<String>,

    pub dataset: Option<UploadedDataset>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_error: Option<String>,

    pub report: Option<GeneratedReport>,

    pub report_delivered: bool,
    pub report_delivered_at: Option<DateTime<Utc>>,
    pub last_delivery_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditRequest {
    /// Create a new request in `PENDING` with no token.
    pub fn new(
        company_name: String,
        contact_name: String,
        customer_email: EmailAddress,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            company_name,
            contact_name,
            customer_email,
            status: AuditStatus::Pending,
            portal_token_hash: None,
            portal_token_expires_at: None,
            token_used_at: None,
            payment_session_id: None,
            paid_at: None,
            amount_paid_cents: None,
            currency: None,
            dataset: None,
            processing_started_at: None,
            processing_error: None,
            report: None,
            report_delivered: false,
            report_delivered_at: None,
            last_delivery_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    // -- Token --------------------------------------------------------------

    /// Install a new token hash, replacing (and so invalidating) any prior one.
    pub fn issue_token(&mut self, hash: TokenHash, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.portal_token_hash = Some(hash);
        self.portal_token_expires_at = Some(expires_at);
        self.token_used_at = None;
        self.updated_at = now;
    }

    /// Validate a presented token hash and mark the token used.
    ///
    /// Validity is inclusive of the expiry instant: a token presented at
    /// exactly `portal_token_expires_at` is accepted.
    pub fn consume_token(
        &mut self,
        presented: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let stored = self.portal_token_hash.ok_or(LifecycleError::TokenNotFound)?;
        if !stored.matches(presented) {
            return Err(LifecycleError::TokenNotFound);
        }
        if let Some(used_at) = self.token_used_at {
            return Err(LifecycleError::TokenAlreadyUsed { used_at });
        }
        let expires_at = self
            .portal_token_expires_at
            .ok_or(LifecycleError::TokenNotFound)?;
        if now > expires_at {
            return Err(LifecycleError::TokenExpired { expired_at: expires_at });
        }
        self.token_used_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    // -- Payment ------------------------------------------------------------

    /// Remember the checkout session created for this request.
    pub fn record_checkout_session(
        &mut self,
        session_id: String,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if self.status != AuditStatus::Pending {
            return Err(LifecycleError::InvalidTransition {
                from: self.status,
                to: AuditStatus::Paid,
                reason: "checkout is only available before payment".into(),
            });
        }
        self.payment_session_id = Some(session_id);
        self.updated_at = now;
        Ok(())
    }

    /// Apply a verified payment. Idempotent once `paid_at` is set.
    pub fn confirm_payment(
        &mut self,
        confirmation: &PaymentConfirmation,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome, LifecycleError> {
        if self.paid_at.is_some() {
            return Ok(PaymentOutcome::AlreadyConfirmed);
        }
        self.require_edge(AuditStatus::Paid, "payment can only be confirmed while pending")?;
        self.status = AuditStatus::Paid;
        self.paid_at = Some(now);
        self.payment_session_id = Some(confirmation.session_id.clone());
        self.amount_paid_cents = Some(confirmation.amount_cents);
        self.currency = Some(confirmation.currency.clone());
        self.updated_at = now;
        Ok(PaymentOutcome::Confirmed)
    }

    // -- Upload & analysis --------------------------------------------------

    /// Check that an upload would be accepted, without mutating.
    pub fn check_upload_allowed(&self) -> Result<(), LifecycleError> {
        if !self.status.is_post_payment() || self.paid_at.is_none() {
            return Err(LifecycleError::PaymentRequired { status: self.status });
        }
        if let Some(report) = &self.report {
            return Err(LifecycleError::AlreadyReported {
                report_id: report.report_id.clone(),
            });
        }
        match self.status {
            AuditStatus::Paid | AuditStatus::Processing | AuditStatus::Failed => Ok(()),
            from => Err(LifecycleError::InvalidTransition {
                from,
                to: AuditStatus::Processing,
                reason: "request is already complete".into(),
            }),
        }
    }

    /// Store a dataset and move to `PROCESSING`.
    ///
    /// Re-uploading before a report exists replaces the stored dataset.
    pub fn record_upload(
        &mut self,
        dataset: UploadedDataset,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.check_upload_allowed()?;
        self.dataset = Some(dataset);
        self.enter_processing(now);
        Ok(())
    }

    /// Re-enter `PROCESSING` for a stored dataset that has no report.
    pub fn restart_processing(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if let Some(report) = &self.report {
            return Err(LifecycleError::AlreadyReported {
                report_id: report.report_id.clone(),
            });
        }
        if self.dataset.is_none() {
            return Err(LifecycleError::DatasetMissing);
        }
        if !matches!(self.status, AuditStatus::Processing | AuditStatus::Failed) {
            return Err(LifecycleError::InvalidTransition {
                from: self.status,
                to: AuditStatus::Processing,
                reason: "only processing or failed requests can be re-queued".into(),
            });
        }
        self.enter_processing(now);
        Ok(())
    }

    fn enter_processing(&mut self, now: DateTime<Utc>) {
        self.status = AuditStatus::Processing;
        self.processing_started_at = Some(now);
        self.processing_error = None;
        self.updated_at = now;
    }

    /// Record the analysis output. The request stays in `PROCESSING` until delivery.
    pub fn record_report(
        &mut self,
        report_id: ReportId,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if let Some(existing) = &self.report {
            return Err(LifecycleError::AlreadyReported {
                report_id: existing.report_id.clone(),
            });
        }
        if self.dataset.is_none() {
            return Err(LifecycleError::DatasetMissing);
        }
        if self.status != AuditStatus::Processing {
            return Err(LifecycleError::InvalidTransition {
                from: self.status,
                to: AuditStatus::Processing,
                reason: "reports are only accepted while processing".into(),
            });
        }
        self.report = Some(GeneratedReport {
            report_id,
            data,
            generated_at: now,
        });
        self.processing_error = None;
        self.updated_at = now;
        Ok(())
    }

    /// Record an analysis failure and move `PROCESSING → FAILED`.
    pub fn record_analysis_failure(
        &mut self,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.require_edge(AuditStatus::Failed, "only a processing request can fail")?;
        self.status = AuditStatus::Failed;
        self.processing_error = Some(error);
        self.updated_at = now;
        Ok(())
    }

    /// Attach an error to the request without changing its status.
    pub fn note_processing_error(&mut self, error: String, now: DateTime<Utc>) {
        self.processing_error = Some(error);
        self.updated_at = now;
    }

    // -- Delivery -----------------------------------------------------------

    /// Record a provider-confirmed send. Idempotent; moves `PROCESSING → COMPLETE`.
    pub fn record_delivery(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if self.report.is_none() {
            return Err(LifecycleError::ReportMissing);
        }
        if self.status == AuditStatus::Processing {
            self.status = AuditStatus::Complete;
        }
        self.report_delivered = true;
        self.report_delivered_at = Some(now);
        self.last_delivery_error = None;
        self.updated_at = now;
        Ok(())
    }

    /// Record a failed send. The report is left untouched.
    pub fn record_delivery_failure(
        &mut self,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if self.report.is_none() {
            return Err(LifecycleError::ReportMissing);
        }
        self.report_delivered = false;
        self.report_delivered_at = None;
        self.last_delivery_error = Some(error);
        self.updated_at = now;
        Ok(())
    }

    /// Re-target delivery to a corrected address and clear delivery flags.
    ///
    /// Status never moves backwards; a `COMPLETE` request stays complete and
    /// is picked up by the undelivered scan.
    pub fn correct_email(&mut self, email: EmailAddress, now: DateTime<Utc>) {
        self.customer_email = email;
        self.report_delivered = false;
        self.report_delivered_at = None;
        self.last_delivery_error = None;
        self.updated_at = now;
    }

    // -- Queries ------------------------------------------------------------

    /// Paid, but no report has been generated.
    pub fn needs_report(&self) -> bool {
        self.paid_at.is_some() && self.report.is_none()
    }

    /// A report exists but has not been delivered.
    pub fn is_undelivered(&self) -> bool {
        self.report.is_some() && !self.report_delivered
    }

    /// Processing with data, no report and no recorded error, started before `cutoff`.
    pub fn is_stalled(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == AuditStatus::Processing
            && self.dataset.is_some()
            && self.report.is_none()
            && self.processing_error.is_none()
            && self.processing_started_at.is_some_and(|started| started < cutoff)
    }

    fn require_edge(&self, to: AuditStatus, reason: &str) -> Result<(), LifecycleError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.status,
                to,
                reason: reason.to_string(),
            })
        }
    }
}

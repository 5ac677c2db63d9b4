//! # Customer Request API
//!
//! Upload of the payroll file and the customer-facing status view.
//! The status view never exposes the dataset, the report body, or the
//! token hash; it tells the customer which stage the request is in.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use payaudit_core::RequestId;
use payaudit_state::{AuditRequest, AuditStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::ingestion::{self, UploadAccepted, UploadedFile};
use crate::services::{load, ServiceError};
use crate::state::AppState;

/// Multipart field carrying the payroll file.
const FILE_FIELD: &str = "file";

/// Room for multipart boundaries and part headers on top of the file limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Coarse progress shown to the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingPayment,
    AwaitingUpload,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerStatus {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub company_name: String,
    pub status: String,
    pub stage: Stage,
    pub paid: bool,
    pub data_uploaded: bool,
    pub row_count: Option<u64>,
    /// Only set once the report has reached the customer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&AuditRequest> for CustomerStatus {
    fn from(r: &AuditRequest) -> Self {
        let stage = match r.status {
            AuditStatus::Pending => Stage::AwaitingPayment,
            AuditStatus::Paid => Stage::AwaitingUpload,
            // A failed analysis is recoverable by an operator; the customer
            // only sees that the audit is still being worked on.
            AuditStatus::Processing | AuditStatus::Failed => Stage::InProgress,
            AuditStatus::Complete if r.report_delivered => Stage::Complete,
            AuditStatus::Complete => Stage::InProgress,
        };
        let complete = stage == Stage::Complete;
        Self {
            request_id: r.id,
            company_name: r.company_name.clone(),
            status: r.status.as_str().to_string(),
            stage,
            paid: r.paid_at.is_some(),
            data_uploaded: r.dataset.is_some(),
            row_count: r.dataset.as_ref().map(|d| d.row_count),
            report_id: r
                .report
                .as_ref()
                .filter(|_| complete)
                .map(|g| g.report_id.as_str().to_string()),
            delivered_at: r.report_delivered_at.filter(|_| complete),
            updated_at: r.updated_at,
        }
    }
}

/// Build the customer request router.
///
/// The body limit on the upload route is derived from the configured file
/// limit so oversized files are refused while streaming.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/v1/requests/{id}/upload",
            post(upload).layer(DefaultBodyLimit::max(
                max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
            )),
        )
        .route("/v1/requests/{id}/status", get(status))
}

/// POST /v1/requests/{id}/upload: Upload the payroll file.
#[utoipa::path(
    post,
    path = "/v1/requests/{id}/upload",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body(content_type = "multipart/form-data", description = "Payroll CSV in the `file` field"),
    responses(
        (status = 202, description = "Accepted, processing", body = UploadAccepted),
        (status = 402, description = "Payment not confirmed", body = crate::error::ErrorBody),
        (status = 404, description = "Request not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid file", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
async fn upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadAccepted>), AppError> {
    let mut multipart =
        multipart.map_err(|e| AppError::Validation(format!("expected multipart/form-data: {}", e.body_text())))?;
    let file = read_file_field(&mut multipart, state.config.max_upload_bytes).await?;
    let accepted = ingestion::accept_upload(&state, RequestId::from_uuid(id), file, Utc::now()).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn read_file_field(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<UploadedFile, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.csv").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_bytes))?;
        return Ok(UploadedFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Err(AppError::Validation(format!(
        "multipart body has no `{FILE_FIELD}` field"
    )))
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::InvalidUpload {
            message: format!("file exceeds the limit of {max_bytes} bytes"),
            issues: Vec::new(),
        }
        .into()
    } else {
        AppError::Validation(format!("malformed multipart body: {}", err.body_text()))
    }
}

/// GET /v1/requests/{id}/status: Customer-facing progress.
#[utoipa::path(
    get,
    path = "/v1/requests/{id}/status",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Current status", body = CustomerStatus),
        (status = 404, description = "Request not found", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
async fn status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomerStatus>, AppError> {
    let request = load(&state, RequestId::from_uuid(id)).await?;
    Ok(Json(CustomerStatus::from(&request)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use payaudit_core::{EmailAddress, ReportId};
    use payaudit_state::{PaymentConfirmation, UploadedDataset};

    fn request() -> AuditRequest {
        AuditRequest::new(
            "Acme".into(),
            "Jane".into(),
            EmailAddress::new("jane@acme.test").unwrap(),
            Utc::now(),
        )
    }

    fn reported() -> AuditRequest {
        let now = Utc::now();
        let mut r = request();
        r.confirm_payment(
            &PaymentConfirmation {
                session_id: "cs_1".into(),
                amount_cents: 100,
                currency: "usd".into(),
            },
            now,
        )
        .unwrap();
        r.record_upload(
            UploadedDataset {
                csv_data: "a\n1\n".into(),
                row_count: 1,
                columns: vec!["a".into()],
                original_file_name: "p.csv".into(),
                file_size: 4,
                uploaded_at: now,
            },
            now,
        )
        .unwrap();
        r.record_report(ReportId::new("rpt_1").unwrap(), serde_json::json!({}), now)
            .unwrap();
        r
    }

    #[test]
    fn pending_request_awaits_payment() {
        let view = CustomerStatus::from(&request());
        assert_eq!(view.stage, Stage::AwaitingPayment);
        assert!(!view.paid);
        assert!(view.report_id.is_none());
    }

    #[test]
    fn undelivered_report_is_still_in_progress() {
        let view = CustomerStatus::from(&reported());
        assert_eq!(view.stage, Stage::InProgress);
        assert!(view.report_id.is_none());
    }

    #[test]
    fn delivered_report_is_complete() {
        let mut r = reported();
        r.record_delivery(Utc::now()).unwrap();
        let view = CustomerStatus::from(&r);
        assert_eq!(view.stage, Stage::Complete);
        assert_eq!(view.report_id.as_deref(), Some("rpt_1"));
        assert!(view.delivered_at.is_some());
    }
}

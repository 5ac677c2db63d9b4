//! Audit request persistence.
//!
//! All queries operate on the `audit_requests` table. Lifecycle rules are
//! enforced by the aggregate in `payaudit-state`; the table carries CHECK
//! constraints for the two invariants that must hold even against manual
//! edits (delivery implies a report, non-pending implies payment).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payaudit_core::{EmailAddress, ReportId, RequestId};
use payaudit_crypto::TokenHash;
use payaudit_state::{AuditRequest, AuditStatus, GeneratedReport, UploadedDataset};
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::Postgres;
use uuid::Uuid;

use crate::repository::{Mutation, RepoError, RequestRepository, UpdateResult};

const SELECT_COLUMNS: &str = "SELECT id, company_name, contact_name, customer_email, status,
        portal_token_hash, portal_token_expires_at, token_used_at,
        payment_session_id, paid_at, amount_paid_cents, currency,
        csv_data, row_count, columns, original_file_name, file_size, file_uploaded_at,
        processing_started_at, processing_error,
        report_id, report_data, report_generated_at,
        report_delivered, report_delivered_at, last_delivery_error,
        created_at, updated_at
     FROM audit_requests";

const INSERT_SQL: &str = "INSERT INTO audit_requests (
        id, company_name, contact_name, customer_email, status,
        portal_token_hash, portal_token_expires_at, token_used_at,
        payment_session_id, paid_at, amount_paid_cents, currency,
        csv_data, row_count, columns, original_file_name, file_size, file_uploaded_at,
        processing_started_at, processing_error,
        report_id, report_data, report_generated_at,
        report_delivered, report_delivered_at, last_delivery_error,
        created_at, updated_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
             $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)";

const UPDATE_SQL: &str = "UPDATE audit_requests SET
        company_name = $2, contact_name = $3, customer_email = $4, status = $5,
        portal_token_hash = $6, portal_token_expires_at = $7, token_used_at = $8,
        payment_session_id = $9, paid_at = $10, amount_paid_cents = $11, currency = $12,
        csv_data = $13, row_count = $14, columns = $15, original_file_name = $16,
        file_size = $17, file_uploaded_at = $18,
        processing_started_at = $19, processing_error = $20,
        report_id = $21, report_data = $22, report_generated_at = $23,
        report_delivered = $24, report_delivered_at = $25, last_delivery_error = $26,
        created_at = $27, updated_at = $28
     WHERE id = $1";

/// Postgres-backed [`RequestRepository`].
#[derive(Debug, Clone)]
pub struct PgRequestRepository {
    pool: PgPool,
}

impl PgRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestRepository for PgRequestRepository {
    async fn insert(&self, request: &AuditRequest) -> Result<(), RepoError> {
        let result = bind_record(sqlx::query(INSERT_SQL), request)?
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepoError::Duplicate(request.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: RequestId) -> Result<Option<AuditRequest>, RepoError> {
        let row = sqlx::query_as::<_, AuditRequestRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(AuditRequestRow::into_record).transpose()
    }

    async fn find_by_token_hash(
        &self,
        hash: &TokenHash,
    ) -> Result<Option<AuditRequest>, RepoError> {
        let row = sqlx::query_as::<_, AuditRequestRow>(&format!(
            "{SELECT_COLUMNS} WHERE portal_token_hash = $1"
        ))
        .bind(hash.to_hex())
        .fetch_optional(&self.pool)
        .await?;
        row.map(AuditRequestRow::into_record).transpose()
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Vec<AuditRequest>, RepoError> {
        let rows = sqlx::query_as::<_, AuditRequestRow>(&format!(
            "{SELECT_COLUMNS} WHERE customer_email = $1 ORDER BY created_at DESC"
        ))
        .bind(email.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditRequestRow::into_record).collect()
    }

    async fn list(&self) -> Result<Vec<AuditRequest>, RepoError> {
        let rows = sqlx::query_as::<_, AuditRequestRow>(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditRequestRow::into_record).collect()
    }

    async fn try_update(
        &self,
        id: RequestId,
        mutation: Mutation<'_>,
    ) -> Result<UpdateResult, RepoError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, AuditRequestRow>(&format!(
            "{SELECT_COLUMNS} WHERE id = $1 FOR UPDATE"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let mut record = row.into_record()?;

        match mutation(&mut record) {
            Ok(()) => {
                bind_record(sqlx::query(UPDATE_SQL), &record)?
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(Some(Ok(record)))
            }
            Err(e) => {
                tx.rollback().await?;
                Ok(Some(Err(e)))
            }
        }
    }

    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Bind every column of `record` in `INSERT_SQL`/`UPDATE_SQL` order.
fn bind_record(
    query: Query<'static, Postgres, PgArguments>,
    record: &AuditRequest,
) -> Result<Query<'static, Postgres, PgArguments>, RepoError> {
    let corrupt = |reason: &str| RepoError::Corrupt {
        id: record.id,
        reason: reason.to_string(),
    };
    let dataset = record.dataset.as_ref();
    let row_count = dataset
        .map(|d| i64::try_from(d.row_count))
        .transpose()
        .map_err(|_| corrupt("row_count exceeds BIGINT"))?;
    let file_size = dataset
        .map(|d| i64::try_from(d.file_size))
        .transpose()
        .map_err(|_| corrupt("file_size exceeds BIGINT"))?;
    let report = record.report.as_ref();

    Ok(query
        .bind(*record.id.as_uuid())
        .bind(record.company_name.clone())
        .bind(record.contact_name.clone())
        .bind(record.customer_email.as_str().to_string())
        .bind(record.status.as_str())
        .bind(record.portal_token_hash.map(|h| h.to_hex()))
        .bind(record.portal_token_expires_at)
        .bind(record.token_used_at)
        .bind(record.payment_session_id.clone())
        .bind(record.paid_at)
        .bind(record.amount_paid_cents)
        .bind(record.currency.clone())
        .bind(dataset.map(|d| d.csv_data.clone()))
        .bind(row_count)
        .bind(dataset.map(|d| d.columns.clone()))
        .bind(dataset.map(|d| d.original_file_name.clone()))
        .bind(file_size)
        .bind(dataset.map(|d| d.uploaded_at))
        .bind(record.processing_started_at)
        .bind(record.processing_error.clone())
        .bind(report.map(|r| r.report_id.as_str().to_string()))
        .bind(report.map(|r| r.data.clone()))
        .bind(report.map(|r| r.generated_at))
        .bind(record.report_delivered)
        .bind(record.report_delivered_at)
        .bind(record.last_delivery_error.clone())
        .bind(record.created_at)
        .bind(record.updated_at))
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct AuditRequestRow {
    id: Uuid,
    company_name: String,
    contact_name: String,
    customer_email: String,
    status: String,
    portal_token_hash: Option<String>,
    portal_token_expires_at: Option<DateTime<Utc>>,
    token_used_at: Option<DateTime<Utc>>,
    payment_session_id: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    amount_paid_cents: Option<i64>,
    currency: Option<String>,
    csv_data: Option<String>,
    row_count: Option<i64>,
    columns: Option<Vec<String>>,
    original_file_name: Option<String>,
    file_size: Option<i64>,
    file_uploaded_at: Option<DateTime<Utc>>,
    processing_started_at: Option<DateTime<Utc>>,
    processing_error: Option<String>,
    report_id: Option<String>,
    report_data: Option<serde_json::Value>,
    report_generated_at: Option<DateTime<Utc>>,
    report_delivered: bool,
    report_delivered_at: Option<DateTime<Utc>>,
    last_delivery_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AuditRequestRow {
    /// Map a row back onto the aggregate.
    ///
    /// Unlike a lenient default, an unreadable row is an error: silently
    /// substituting a status here could re-open the payment gate.
    fn into_record(self) -> Result<AuditRequest, RepoError> {
        let id = RequestId::from_uuid(self.id);
        let corrupt = |reason: String| {
            tracing::error!(%id, %reason, "corrupt audit_requests row");
            RepoError::Corrupt { id, reason }
        };

        let status: AuditStatus = self.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let customer_email =
            EmailAddress::new(self.customer_email).map_err(|e| corrupt(e.to_string()))?;
        let portal_token_hash = self
            .portal_token_hash
            .map(|h| TokenHash::from_hex(h.trim()))
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;

        let dataset = match self.csv_data {
            Some(csv_data) => Some(UploadedDataset {
                csv_data,
                row_count: self
                    .row_count
                    .and_then(|n| u64::try_from(n).ok())
                    .ok_or_else(|| corrupt("dataset without valid row_count".into()))?,
                columns: self.columns.unwrap_or_default(),
                original_file_name: self.original_file_name.unwrap_or_default(),
                file_size: self
                    .file_size
                    .and_then(|n| u64::try_from(n).ok())
                    .unwrap_or_default(),
                uploaded_at: self
                    .file_uploaded_at
                    .ok_or_else(|| corrupt("dataset without file_uploaded_at".into()))?,
            }),
            None => None,
        };

        let report = match (self.report_id, self.report_data) {
            (Some(report_id), Some(data)) => Some(GeneratedReport {
                report_id: ReportId::new(report_id).map_err(|e| corrupt(e.to_string()))?,
                data,
                generated_at: self.report_generated_at.unwrap_or(self.updated_at),
            }),
            (None, None) => None,
            _ => return Err(corrupt("report_id and report_data must be set together".into())),
        };

        Ok(AuditRequest {
            id,
            company_name: self.company_name,
            contact_name: self.contact_name,
            customer_email,
            status,
            portal_token_hash,
            portal_token_expires_at: self.portal_token_expires_at,
            token_used_at: self.token_used_at,
            payment_session_id: self.payment_session_id,
            paid_at: self.paid_at,
            amount_paid_cents: self.amount_paid_cents,
            currency: self.currency,
            dataset,
            processing_started_at: self.processing_started_at,
            processing_error: self.processing_error,
            report,
            report_delivered: self.report_delivered,
            report_delivered_at: self.report_delivered_at,
            last_delivery_error: self.last_delivery_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

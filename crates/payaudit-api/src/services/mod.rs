//! # Lifecycle Services
//!
//! Orchestration between the HTTP surface, the repository, and the external
//! collaborators. Each module owns one group of aggregate fields:
//!
//! - [`tokens`]: portal token issue/consume and the access-request flow
//! - [`payment`]: checkout creation and the payment gate
//! - [`ingestion`]: CSV validation and upload acceptance
//! - [`analysis`]: the analysis work queue and its worker
//! - [`delivery`]: report emails and delivery tracking
//! - [`recovery`]: operator scans and reconciliation
//!
//! Services return [`ServiceError`]; the route layer converts it to
//! [`AppError`](crate::error::AppError).

pub mod analysis;
pub mod delivery;
pub mod ingestion;
pub mod locks;
pub mod payment;
pub mod recovery;
pub mod report;
pub mod tokens;

use payaudit_clients::ClientError;
use payaudit_core::RequestId;
use payaudit_state::{AuditRequest, LifecycleError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::repository::{Mutation, RepoError};
use crate::state::AppState;

/// One row/field problem found while parsing an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadIssue {
    /// 1-based line number in the file, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    /// Column name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Service-layer error taxonomy.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    InvalidUpload {
        message: String,
        issues: Vec<UploadIssue>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("portal token expired")]
    TokenExpired,

    #[error("portal token already used")]
    TokenAlreadyUsed,

    #[error("{0}")]
    PaymentRequired(String),

    #[error("{0}")]
    Conflict(String),

    /// The report exists but the email provider did not confirm the send.
    #[error("report not delivered: {reason}")]
    DeliveryFailed { reason: String },

    #[error("{collaborator} failed: {source}")]
    ExternalService {
        collaborator: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Storage(#[from] RepoError),
}

impl ServiceError {
    pub(crate) fn external(collaborator: &'static str, source: ClientError) -> Self {
        Self::ExternalService {
            collaborator,
            source,
        }
    }

    pub(crate) fn request_not_found(id: RequestId) -> Self {
        Self::NotFound(format!("audit request {id} not found"))
    }
}

impl From<LifecycleError> for ServiceError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::TokenNotFound => Self::NotFound("portal link not recognised".into()),
            LifecycleError::TokenExpired { .. } => Self::TokenExpired,
            LifecycleError::TokenAlreadyUsed { .. } => Self::TokenAlreadyUsed,
            e @ LifecycleError::PaymentRequired { .. } => Self::PaymentRequired(e.to_string()),
            e @ (LifecycleError::InvalidTransition { .. }
            | LifecycleError::ReportMissing
            | LifecycleError::AlreadyReported { .. }
            | LifecycleError::DatasetMissing) => Self::Conflict(e.to_string()),
        }
    }
}

/// Load a request or fail with `NotFound`.
pub(crate) async fn load(state: &AppState, id: RequestId) -> Result<AuditRequest, ServiceError> {
    state
        .repo
        .get(id)
        .await?
        .ok_or_else(|| ServiceError::request_not_found(id))
}

/// Apply one lifecycle mutation, flattening the repository result.
pub(crate) async fn mutate<'a, F>(
    state: &AppState,
    id: RequestId,
    f: F,
) -> Result<AuditRequest, ServiceError>
where
    F: FnOnce(&mut AuditRequest) -> Result<(), LifecycleError> + Send + 'a,
{
    let mutation: Mutation<'a> = Box::new(f);
    match state.repo.try_update(id, mutation).await? {
        None => Err(ServiceError::request_not_found(id)),
        Some(result) => result.map_err(ServiceError::from),
    }
}

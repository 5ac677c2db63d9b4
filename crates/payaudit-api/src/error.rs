//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`ServiceError`] and domain validation errors to HTTP status codes
//! and a stable JSON envelope. Internal and upstream error details are
//! logged, never returned to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::services::{ServiceError, UploadIssue};

/// Guidance attached to every portal-token failure.
const NEW_LINK_GUIDANCE: &str = "request a new portal link";

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "PAYMENT_REQUIRED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (422).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Uploaded file rejected, with row/field issues (422).
    #[error("invalid upload: {message}")]
    InvalidUpload {
        message: String,
        issues: Vec<UploadIssue>,
    },

    /// Missing or invalid admin bearer token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Portal token past its expiry (410).
    #[error("portal link expired: {0}")]
    TokenExpired(String),

    /// Portal token already consumed (409).
    #[error("portal link already used: {0}")]
    TokenAlreadyUsed(String),

    /// No confirmed payment for the request (402).
    #[error("payment required: {0}")]
    PaymentRequired(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A collaborator returned an error or is unreachable (502).
    #[error("upstream error: {0}")]
    UpstreamError(String),

    /// Service dependency not configured (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"),
            Self::InvalidUpload { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_UPLOAD"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::TokenExpired(_) => (StatusCode::GONE, "TOKEN_EXPIRED"),
            Self::TokenAlreadyUsed(_) => (StatusCode::CONFLICT, "TOKEN_ALREADY_USED"),
            Self::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal/upstream error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::UpstreamError(_) => "An upstream service error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::UpstreamError(_) => tracing::error!(error = %self, "upstream service error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => {}
        }

        let details = match self {
            Self::InvalidUpload { issues, .. } if !issues.is_empty() => {
                serde_json::to_value(&issues).ok().map(|v| serde_json::json!({ "issues": v }))
            }
            Self::TokenExpired(_) | Self::TokenAlreadyUsed(_) => {
                Some(serde_json::json!({ "action": NEW_LINK_GUIDANCE }))
            }
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<payaudit_core::ValidationError> for AppError {
    fn from(err: payaudit_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::Validation(msg),
            ServiceError::InvalidUpload { message, issues } => {
                Self::InvalidUpload { message, issues }
            }
            ServiceError::NotFound(msg) => Self::NotFound(msg),
            ServiceError::TokenExpired => {
                Self::TokenExpired(format!("this link has expired; {NEW_LINK_GUIDANCE}"))
            }
            ServiceError::TokenAlreadyUsed => {
                Self::TokenAlreadyUsed(format!("this link was already used; {NEW_LINK_GUIDANCE}"))
            }
            ServiceError::PaymentRequired(msg) => Self::PaymentRequired(msg),
            ServiceError::Conflict(msg) => Self::Conflict(msg),
            ServiceError::DeliveryFailed { reason } => {
                Self::UpstreamError(format!("report delivery failed: {reason}"))
            }
            err @ ServiceError::ExternalService { .. } => Self::UpstreamError(err.to_string()),
            ServiceError::NotConfigured(what) => {
                Self::ServiceUnavailable(format!("{what} is not configured"))
            }
            err @ ServiceError::Storage(_) => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn not_found_status_code() {
        let (status, code) = AppError::NotFound("x".into()).status_and_code();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "NOT_FOUND");
    }

    #[test]
    fn payment_required_is_402() {
        let (status, code) = AppError::PaymentRequired("x".into()).status_and_code();
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(code, "PAYMENT_REQUIRED");
    }

    #[test]
    fn token_errors_have_distinct_codes() {
        assert_eq!(
            AppError::TokenExpired("x".into()).status_and_code(),
            (StatusCode::GONE, "TOKEN_EXPIRED")
        );
        assert_eq!(
            AppError::TokenAlreadyUsed("x".into()).status_and_code(),
            (StatusCode::CONFLICT, "TOKEN_ALREADY_USED")
        );
    }

    #[test]
    fn upstream_and_unavailable_codes() {
        assert_eq!(
            AppError::UpstreamError("x".into()).status_and_code(),
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
        );
        assert_eq!(
            AppError::ServiceUnavailable("x".into()).status_and_code(),
            (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
        );
    }

    #[tokio::test]
    async fn internal_message_is_hidden() {
        let resp = AppError::Internal("db password=hunter2".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn upstream_message_is_hidden() {
        let resp = AppError::UpstreamError("email provider 500: secret".into()).into_response();
        let body = body_json(resp).await;
        assert!(!body.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn token_errors_carry_guidance() {
        let resp = AppError::from(ServiceError::TokenAlreadyUsed).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["details"]["action"], NEW_LINK_GUIDANCE);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("new portal link"));
    }

    #[tokio::test]
    async fn invalid_upload_lists_issues() {
        let err = AppError::InvalidUpload {
            message: "2 rows could not be parsed".into(),
            issues: vec![UploadIssue {
                row: Some(3),
                field: None,
                message: "expected 2 fields, found 3".into(),
            }],
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], "INVALID_UPLOAD");
        assert_eq!(body["error"]["details"]["issues"][0]["row"], 3);
    }

    #[test]
    fn not_configured_maps_to_503() {
        let err = AppError::from(ServiceError::NotConfigured("payment processor"));
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[test]
    fn validation_error_converts() {
        let err: AppError = payaudit_core::EmailAddress::new("nope").unwrap_err().into();
        assert!(matches!(err, AppError::Validation(_)));
    }
}

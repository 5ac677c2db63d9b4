//! # Token Service
//!
//! Issues and consumes single-use portal tokens, and runs the access-request
//! flow that emails a fresh link.
//!
//! Only [`TokenHash`](payaudit_crypto::TokenHash) reaches the repository. The
//! raw [`PortalToken`] lives until the link email is rendered and is never
//! logged or returned over HTTP.

use chrono::{DateTime, Utc};
use payaudit_clients::EmailMessage;
use payaudit_core::error::require_text;
use payaudit_core::{EmailAddress, RequestId};
use payaudit_crypto::PortalToken;
use payaudit_state::{AuditRequest, AuditStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{mutate, report, ServiceError};
use crate::config::AppConfig;
use crate::middleware::metrics as telemetry;
use crate::state::AppState;

const MAX_NAME_LEN: usize = 200;

/// Install a fresh token on `id`, invalidating any previous one.
pub async fn issue_token(
    state: &AppState,
    id: RequestId,
    now: DateTime<Utc>,
) -> Result<(PortalToken, DateTime<Utc>), ServiceError> {
    let token = PortalToken::generate();
    let hash = token.hash();
    let expires_at = now + state.config.portal_token_ttl();
    mutate(state, id, move |r| {
        r.issue_token(hash, expires_at, now);
        Ok(())
    })
    .await?;
    telemetry::token_issued();
    tracing::info!(request_id = %id, %expires_at, "portal token issued");
    Ok((token, expires_at))
}

/// Validate a presented raw token and mark it used.
///
/// The lookup and the mark-used run inside one repository update, so two
/// concurrent presentations of the same token cannot both succeed.
pub async fn validate_and_consume(
    state: &AppState,
    raw: &str,
    now: DateTime<Utc>,
) -> Result<AuditRequest, ServiceError> {
    let not_found = || {
        telemetry::token_consumed("not_found");
        ServiceError::NotFound("portal link not recognised".into())
    };
    let Ok(presented) = PortalToken::parse(raw) else {
        return Err(not_found());
    };
    let hash = presented.hash();
    let Some(candidate) = state.repo.find_by_token_hash(&hash).await? else {
        return Err(not_found());
    };

    match mutate(state, candidate.id, move |r| r.consume_token(&hash, now)).await {
        Ok(request) => {
            telemetry::token_consumed("consumed");
            tracing::info!(request_id = %request.id, "portal token consumed");
            Ok(request)
        }
        Err(err) => {
            let outcome = match &err {
                ServiceError::TokenExpired => "expired",
                ServiceError::TokenAlreadyUsed => "already_used",
                _ => "not_found",
            };
            telemetry::token_consumed(outcome);
            tracing::info!(request_id = %candidate.id, outcome, "portal token rejected");
            Err(err)
        }
    }
}

/// `<base>/portal/access?token=<raw>`.
pub fn portal_link(config: &AppConfig, token: &PortalToken) -> String {
    format!("{}?token={}", config.public_url("/portal/access"), token.expose())
}

// -- Access request -----------------------------------------------------------

/// Input to [`request_access`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AccessRequest {
    pub company_name: String,
    pub contact_name: String,
    /// Address the portal link (and later the report) is sent to.
    pub email: String,
}

/// Result of [`request_access`]. Never contains the token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessResponse {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    /// Whether the email provider accepted the link email.
    pub link_sent: bool,
    pub expires_at: DateTime<Utc>,
}

/// Create or reuse a request for the email and send a fresh portal link.
///
/// The newest non-complete request for the address is reused, so asking
/// again re-issues the token rather than opening a second paid audit.
pub async fn request_access(
    state: &AppState,
    input: AccessRequest,
    now: DateTime<Utc>,
) -> Result<AccessResponse, ServiceError> {
    let company_name = require_text("company_name", &input.company_name, MAX_NAME_LEN)
        .map_err(|e| ServiceError::Validation(e.to_string()))?;
    let contact_name = require_text("contact_name", &input.contact_name, MAX_NAME_LEN)
        .map_err(|e| ServiceError::Validation(e.to_string()))?;
    let email =
        EmailAddress::new(input.email).map_err(|e| ServiceError::Validation(e.to_string()))?;

    let existing = state
        .repo
        .find_by_email(&email)
        .await?
        .into_iter()
        .find(|r| r.status != AuditStatus::Complete);
    let request_id = match existing {
        Some(r) => {
            tracing::info!(request_id = %r.id, "reusing open audit request");
            r.id
        }
        None => {
            let fresh = AuditRequest::new(company_name, contact_name, email, now);
            state.repo.insert(&fresh).await?;
            tracing::info!(request_id = %fresh.id, "audit request created");
            fresh.id
        }
    };

    let (token, expires_at) = issue_token(state, request_id, now).await?;
    let request = super::load(state, request_id).await?;
    let link_sent = send_link(state, &request, &token, expires_at).await;

    Ok(AccessResponse {
        request_id,
        link_sent,
        expires_at,
    })
}

async fn send_link(
    state: &AppState,
    request: &AuditRequest,
    token: &PortalToken,
    expires_at: DateTime<Utc>,
) -> bool {
    let Some(provider) = &state.email else {
        tracing::warn!(request_id = %request.id, "email provider not configured; portal link not sent");
        return false;
    };
    let link = portal_link(&state.config, token);
    let message = EmailMessage {
        from: state.config.email_from.clone(),
        to: request.customer_email.as_str().to_string(),
        subject: "Your payroll audit portal link".to_string(),
        html: report::render_portal_link_html(request, &link, expires_at),
    };
    match provider.send(&message).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(request_id = %request.id, "email provider refused portal link");
            false
        }
        Err(e) => {
            tracing::warn!(request_id = %request.id, error = %e, "portal link email failed");
            false
        }
    }
}

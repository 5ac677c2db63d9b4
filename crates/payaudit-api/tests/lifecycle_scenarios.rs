//! # Lifecycle Scenarios
//!
//! End-to-end walks through the HTTP surface with in-memory collaborators:
//! link request, checkout, confirmation, upload, background analysis and
//! delivery, plus the operator repairs for undelivered reports.

mod common;

use axum::http::{header, StatusCode};
use payaudit_clients::mock::SendBehavior;
use payaudit_core::RequestId;
use payaudit_state::AuditStatus;
use serde_json::{json, Value};

use common::{assert_status, body_json, token_from_html, Harness, SAMPLE_CSV};

/// Request access, redeem the emailed link, pay, and confirm.
async fn paid_through_portal(h: &Harness, email: &str) -> RequestId {
    let response = h
        .post_json(
            "/v1/portal/request",
            json!({ "company_name": "Acme Payroll Ltd", "contact_name": "Jane Doe", "email": email }),
        )
        .await;
    assert_status(&response, StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["link_sent"], true);
    assert!(body.get("token").is_none());
    let id: RequestId = body["request_id"].as_str().unwrap().parse().unwrap();

    let link_email = h.email.sent().last().cloned().unwrap();
    assert_eq!(link_email.to, email);
    let token = token_from_html(&link_email.html);
    assert_eq!(token.len(), 64);

    let response = h.redeem(&token).await;
    assert_status(&response, StatusCode::OK);
    let granted = body_json(response).await;
    assert_eq!(granted["next"], "checkout");
    let checkout_url = granted["redirect_url"].as_str().unwrap().to_string();
    let session_id = checkout_url.rsplit('/').next().unwrap().to_string();

    assert!(h.payments.mark_paid(&session_id));
    let response = h
        .post_json(
            "/v1/payments/confirm",
            json!({ "request_id": id.to_string(), "session_id": session_id }),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let confirmed = body_json(response).await;
    assert_eq!(confirmed["status"], "paid");
    assert_eq!(confirmed["newly_confirmed"], true);
    id
}

async fn status_of(h: &Harness, id: RequestId) -> Value {
    let response = h.get(&format!("/v1/requests/{id}/status")).await;
    assert_status(&response, StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn happy_path_delivers_report() {
    let h = Harness::new();
    let id = paid_through_portal(&h, "jane@acme.test").await;
    assert_eq!(status_of(&h, id).await["stage"], "awaiting_upload");

    let response = h.upload(id, "payroll.csv", SAMPLE_CSV).await;
    assert_status(&response, StatusCode::ACCEPTED);

    let done = h.wait_for(id, |r| r.report_delivered).await;
    assert_eq!(done.status, AuditStatus::Complete);
    assert!(done.last_delivery_error.is_none());
    assert_eq!(h.analysis.calls(), 1);
    assert_eq!(h.analysis.inputs()[0].row_count, 3);

    let status = status_of(&h, id).await;
    assert_eq!(status["stage"], "complete");
    assert_eq!(status["report_id"], "rpt_test_1");

    let report_email = h.email.sent().last().cloned().unwrap();
    assert_eq!(report_email.to, "jane@acme.test");
    assert!(report_email.html.contains("Overtime not itemised"));
}

#[tokio::test]
async fn portal_link_is_single_use() {
    let h = Harness::new();
    let response = h
        .post_json(
            "/v1/portal/request",
            json!({ "company_name": "Acme", "contact_name": "Jane", "email": "jane@acme.test" }),
        )
        .await;
    assert_status(&response, StatusCode::ACCEPTED);
    let token = token_from_html(&h.email.sent()[0].html);

    let first = h.redeem(&token).await;
    assert_status(&first, StatusCode::OK);

    let second = h.redeem(&token).await;
    assert_status(&second, StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["error"]["code"], "TOKEN_ALREADY_USED");
    assert_eq!(body["error"]["details"]["action"], "request a new portal link");
}

#[tokio::test]
async fn browser_redeem_redirects_to_checkout() {
    let h = Harness::new();
    h.post_json(
        "/v1/portal/request",
        json!({ "company_name": "Acme", "contact_name": "Jane", "email": "jane@acme.test" }),
    )
    .await;
    let token = token_from_html(&h.email.sent()[0].html);

    let response = h.get(&format!("/portal/access?token={token}")).await;
    assert_status(&response, StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://checkout.invalid/pay/"));
}

#[tokio::test]
async fn new_link_invalidates_previous_one() {
    let h = Harness::new();
    let access = json!({ "company_name": "Acme", "contact_name": "Jane", "email": "jane@acme.test" });
    h.post_json("/v1/portal/request", access.clone()).await;
    let old = token_from_html(&h.email.sent()[0].html);
    h.post_json("/v1/portal/request", access).await;
    let new = token_from_html(&h.email.sent()[1].html);

    assert_status(&h.redeem(&old).await, StatusCode::NOT_FOUND);
    assert_status(&h.redeem(&new).await, StatusCode::OK);
}

#[tokio::test]
async fn webhook_confirms_payment_once() {
    let h = Harness::new();
    h.post_json(
        "/v1/portal/request",
        json!({ "company_name": "Acme", "contact_name": "Jane", "email": "jane@acme.test" }),
    )
    .await;
    let token = token_from_html(&h.email.sent()[0].html);
    let granted = body_json(h.redeem(&token).await).await;
    let session_id = granted["redirect_url"]
        .as_str()
        .unwrap()
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();

    let event = json!({ "type": "checkout.session.completed", "data": { "session_id": session_id } });
    let response = h.post_json("/v1/payments/webhook", event.clone()).await;
    assert_status(&response, StatusCode::PAYMENT_REQUIRED);

    h.payments.mark_paid(&session_id);
    let first = body_json(h.post_json("/v1/payments/webhook", event.clone()).await).await;
    assert_eq!(first["confirmation"]["newly_confirmed"], true);
    let second = body_json(h.post_json("/v1/payments/webhook", event).await).await;
    assert_eq!(second["confirmation"]["newly_confirmed"], false);
    assert_eq!(second["confirmation"]["status"], "paid");
}

#[tokio::test]
async fn failed_delivery_is_repaired_by_email_correction() {
    let h = Harness::new();
    let id = paid_through_portal(&h, "jane@acme.test").await;
    h.email.set_behavior(SendBehavior::Fail);

    assert_status(
        &h.upload(id, "payroll.csv", SAMPLE_CSV).await,
        StatusCode::ACCEPTED,
    );
    let stuck = h
        .wait_for(id, |r| r.report.is_some() && r.last_delivery_error.is_some())
        .await;
    assert!(!stuck.report_delivered);
    assert_eq!(stuck.status, AuditStatus::Processing);
    assert_eq!(status_of(&h, id).await["stage"], "in_progress");

    let undelivered = body_json(h.admin_get("/v1/admin/requests/undelivered").await).await;
    assert_eq!(undelivered.as_array().unwrap().len(), 1);
    assert_eq!(undelivered[0]["request_id"], id.to_string());

    h.email.set_behavior(SendBehavior::Accept);
    let response = h
        .admin_post(
            &format!("/v1/admin/requests/{id}/correct-email"),
            Some(json!({ "email": "new@x.com" })),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let corrected = body_json(response).await;
    assert_eq!(corrected["previous_email"], "jane@acme.test");
    assert_eq!(corrected["email"], "new@x.com");
    assert_eq!(corrected["resent"], true);
    assert_eq!(corrected["delivered"], true);

    let stored = h.stored(id).await;
    assert!(stored.report_delivered);
    assert_eq!(stored.status, AuditStatus::Complete);
    assert_eq!(stored.customer_email.as_str(), "new@x.com");
    assert_eq!(h.email.sent().last().unwrap().to, "new@x.com");
    assert_eq!(h.analysis.calls(), 1);

    let undelivered = body_json(h.admin_get("/v1/admin/requests/undelivered").await).await;
    assert_eq!(undelivered, json!([]));
}

#[tokio::test]
async fn reconcile_undelivered_resends_and_is_idempotent() {
    let h = Harness::new();
    let id = paid_through_portal(&h, "jane@acme.test").await;
    h.email.set_behavior(SendBehavior::Refuse);
    h.upload(id, "payroll.csv", SAMPLE_CSV).await;
    h.wait_for(id, |r| r.last_delivery_error.is_some()).await;

    h.email.set_behavior(SendBehavior::Accept);
    let results = body_json(h.admin_post("/v1/admin/reconcile/undelivered", None).await).await;
    assert_eq!(results.as_array().unwrap().len(), 1);
    assert_eq!(results[0]["delivered"], true);

    let attempts = h.email.attempts();
    let again = body_json(h.admin_post("/v1/admin/reconcile/undelivered", None).await).await;
    assert_eq!(again, json!([]));
    assert_eq!(h.email.attempts(), attempts);

    let missing = body_json(h.admin_post("/v1/admin/reconcile/missing-reports", None).await).await;
    assert_eq!(missing["requeued"], json!([]));
    assert_eq!(h.analysis.calls(), 1);
}

#[tokio::test]
async fn correct_email_without_report_sends_nothing() {
    let h = Harness::new();
    let request = h.seed_paid("jane@acme.test").await;
    let attempts = h.email.attempts();

    let response = h
        .admin_post(
            &format!("/v1/admin/requests/{}/correct-email", request.id),
            Some(json!({ "email": "jane@acme.example" })),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let corrected = body_json(response).await;
    assert_eq!(corrected["resent"], false);
    assert_eq!(corrected["delivered"], false);
    assert_eq!(h.email.attempts(), attempts);
    assert_eq!(
        h.stored(request.id).await.customer_email.as_str(),
        "jane@acme.example"
    );
}

#[tokio::test]
async fn resend_without_report_is_conflict() {
    let h = Harness::new();
    let request = h.seed_paid("jane@acme.test").await;
    let response = h
        .admin_post(&format!("/v1/admin/requests/{}/resend", request.id), None)
        .await;
    assert_status(&response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn failed_analysis_is_requeued_by_reconciliation() {
    let h = Harness::new();
    let request = h.seed_paid("jane@acme.test").await;
    let awaiting = h.seed_paid("bob@acme.test").await;
    h.analysis.set_failure("engine timeout");

    h.upload(request.id, "payroll.csv", SAMPLE_CSV).await;
    let failed = h.wait_for(request.id, |r| r.status == AuditStatus::Failed).await;
    assert!(failed
        .processing_error
        .as_deref()
        .is_some_and(|e| e.contains("engine timeout")));

    let scan = body_json(h.admin_get("/v1/admin/requests/without-report").await).await;
    let reasons: Vec<(String, String)> = scan
        .as_array()
        .unwrap()
        .iter()
        .map(|m| {
            (
                m["request_id"].as_str().unwrap().to_string(),
                m["reason"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert!(reasons.contains(&(request.id.to_string(), "failed".to_string())));
    assert!(reasons.contains(&(awaiting.id.to_string(), "awaiting_upload".to_string())));

    h.analysis.set_success(
        payaudit_core::ReportId::new("rpt_retry").unwrap(),
        json!({ "summary": {} }),
    );
    let outcome = body_json(h.admin_post("/v1/admin/reconcile/missing-reports", None).await).await;
    assert_eq!(outcome["requeued"], json!([request.id.to_string()]));
    assert_eq!(outcome["awaiting_upload"][0]["request_id"], awaiting.id.to_string());

    let done = h.wait_for(request.id, |r| r.report_delivered).await;
    assert_eq!(done.status, AuditStatus::Complete);
    assert_eq!(h.stored(awaiting.id).await.status, AuditStatus::Paid);
}

#[tokio::test]
async fn search_by_email_finds_near_misses() {
    let h = Harness::new();
    let request = h.seed_paid("jane@acme.test").await;

    let exact = body_json(h.admin_get("/v1/admin/requests/search?email=jane@acme.test").await).await;
    assert_eq!(exact[0]["request_id"], request.id.to_string());
    assert_eq!(exact[0]["match_kind"], "exact");

    let miss = body_json(h.admin_get("/v1/admin/requests/search?email=jane@acme.tset").await).await;
    assert_eq!(miss, json!([]));

    let fuzzy = body_json(
        h.admin_get("/v1/admin/requests/search?email=jane@acme.tset&fuzzy=true")
            .await,
    )
    .await;
    assert_eq!(fuzzy.as_array().unwrap().len(), 1);
    assert_eq!(fuzzy[0]["request_id"], request.id.to_string());
}

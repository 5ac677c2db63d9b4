//! Contract tests for the CLI's admin client and command handlers.

use payaudit_cli::client::AdminClient;
use payaudit_cli::output::Format;
use payaudit_cli::reconcile::{run_undelivered, ReconcileArgs};
use payaudit_cli::requests::{run_correct_email, run_find, CorrectEmailArgs, FindArgs};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> AdminClient {
    AdminClient::new(&server.uri(), Some("admin-secret".into())).unwrap()
}

#[tokio::test]
async fn get_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/admin/requests/undelivered"))
        .and(header("authorization", "Bearer admin-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let body = client(&server)
        .get("/v1/admin/requests/undelivered")
        .await
        .unwrap();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn error_envelope_becomes_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/admin/requests/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "NOT_FOUND", "message": "request nope not found" }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .get("/v1/admin/requests/nope")
        .await
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("NOT_FOUND"), "{text}");
    assert!(text.contains("request nope not found"), "{text}");
}

#[tokio::test]
async fn undelivered_apply_exits_two_on_failed_resend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/admin/reconcile/undelivered"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "request_id": "r1", "email": "a@x.io", "delivered": true },
            { "request_id": "r2", "email": "b@x.io", "delivered": false, "error": "bounced" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let code = run_undelivered(&client(&server), &ReconcileArgs { apply: true }, Format::Json)
        .await
        .unwrap();
    assert_eq!(code, 2);
}

#[tokio::test]
async fn undelivered_scan_does_not_post() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/admin/requests/undelivered"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let code = run_undelivered(&client(&server), &ReconcileArgs { apply: false }, Format::Text)
        .await
        .unwrap();
    assert_eq!(code, 0);
}

#[tokio::test]
async fn correct_email_posts_new_address() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/admin/requests/r1/correct-email"))
        .and(body_json(json!({ "email": "new@x.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": "r1",
            "previous_email": "old@x.com",
            "email": "new@x.com",
            "resent": true,
            "delivered": true,
            "message": "report resent to new@x.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let args = CorrectEmailArgs {
        id: "r1".into(),
        email: "new@x.com".into(),
    };
    let code = run_correct_email(&client(&server), &args, Format::Text)
        .await
        .unwrap();
    assert_eq!(code, 0);
}

#[tokio::test]
async fn find_encodes_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/admin/requests/search"))
        .and(query_param("email", "jane+audit@acme.test"))
        .and(query_param("fuzzy", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let args = FindArgs {
        email: "jane+audit@acme.test".into(),
        fuzzy: true,
    };
    let code = run_find(&client(&server), &args, Format::Text).await.unwrap();
    assert_eq!(code, 0);
}

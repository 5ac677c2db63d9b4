//! Contract tests for HttpPaymentProcessor against a simulated processor.

use std::collections::HashMap;

use payaudit_clients::{
    CheckoutRequest, HttpPaymentProcessor, PaymentConfig, PaymentProcessor, SessionPaymentStatus,
};
use payaudit_core::RequestId;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(mock_server: &MockServer) -> HttpPaymentProcessor {
    let config = PaymentConfig {
        base_url: mock_server.uri().parse().unwrap(),
        api_key: zeroize::Zeroizing::new("sk_test_123".into()),
        timeout_secs: 5,
    };
    HttpPaymentProcessor::new(&config).unwrap()
}

fn checkout_request(request_id: RequestId) -> CheckoutRequest {
    CheckoutRequest {
        amount: 29_900,
        currency: "usd".into(),
        product_name: "Payroll audit".into(),
        customer_email: "jane@acme.com".into(),
        success_url: "http://localhost:8080/portal/success".into(),
        cancel_url: "http://localhost:8080/portal/cancel".into(),
        metadata: HashMap::from([("request_id".into(), request_id.to_string())]),
    }
}

// ── POST /v1/checkout/sessions ───────────────────────────────────────

#[tokio::test]
async fn create_session_sends_metadata_and_bearer_key() {
    let mock_server = MockServer::start().await;
    let request_id = RequestId::new();

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(body_partial_json(serde_json::json!({
            "amount": 29900,
            "metadata": { "request_id": request_id.to_string() }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_test_abc",
            "url": "https://checkout.example/pay/cs_test_abc",
            "payment_status": "unpaid",
            "amount_total": 29900,
            "currency": "usd",
            "metadata": { "request_id": request_id.to_string() }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let session = client
        .create_checkout_session(&checkout_request(request_id))
        .await
        .unwrap();
    assert_eq!(session.id, "cs_test_abc");
    assert_eq!(session.payment_status, SessionPaymentStatus::Unpaid);
    assert_eq!(session.request_id(), Some(request_id));
}

#[tokio::test]
async fn create_session_surfaces_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(402).set_body_string("card_declined"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client
        .create_checkout_session(&checkout_request(RequestId::new()))
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("402"), "got: {msg}");
    assert!(msg.contains("card_declined"));
}

#[tokio::test]
async fn create_session_without_url_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_no_url",
            "payment_status": "unpaid"
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client
        .create_checkout_session(&checkout_request(RequestId::new()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no checkout url"));
}

// ── GET /v1/checkout/sessions/{id} ───────────────────────────────────

#[tokio::test]
async fn retrieve_paid_session() {
    let mock_server = MockServer::start().await;
    let request_id = RequestId::new();

    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_paid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_paid",
            "payment_status": "paid",
            "amount_total": 29900,
            "currency": "usd",
            "metadata": { "request_id": request_id.to_string() }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let session = client.retrieve_session("cs_paid").await.unwrap().unwrap();
    assert!(session.is_paid());
    assert_eq!(session.amount_total, Some(29_900));
    assert_eq!(session.request_id(), Some(request_id));
}

#[tokio::test]
async fn retrieve_unknown_session_returns_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    assert!(client.retrieve_session("cs_missing").await.unwrap().is_none());
}

#[tokio::test]
async fn retrieve_retries_while_processor_is_unavailable() {
    let mock_server = MockServer::start().await;
    let request_id = RequestId::new();

    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_busy"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_busy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_busy",
            "payment_status": "paid",
            "amount_total": 29900,
            "currency": "usd",
            "metadata": { "request_id": request_id.to_string() }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let session = client.retrieve_session("cs_busy").await.unwrap().unwrap();
    assert!(session.is_paid());
}

#[tokio::test]
async fn retrieve_gives_up_after_bounded_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client.retrieve_session("cs_down").await.unwrap_err();
    assert!(err.to_string().contains("503"), "{err}");
}

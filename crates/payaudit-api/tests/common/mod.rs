//! Shared harness for the API integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use payaudit_api::auth::SecretToken;
use payaudit_api::{AppConfig, AppState, Collaborators};
use payaudit_clients::mock::{MockPaymentProcessor, RecordingEmailProvider, StaticAnalysisEngine};
use payaudit_core::{EmailAddress, ReportId, RequestId};
use payaudit_state::{AuditRequest, PaymentConfirmation};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token";
const BOUNDARY: &str = "payaudit-test-boundary";

/// An app wired to in-memory collaborators the test can inspect.
pub struct Harness {
    pub app: Router,
    pub state: AppState,
    pub payments: Arc<MockPaymentProcessor>,
    pub email: Arc<RecordingEmailProvider>,
    pub analysis: Arc<StaticAnalysisEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let config = AppConfig {
            admin_token: Some(SecretToken::new(ADMIN_TOKEN)),
            ..AppConfig::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: AppConfig) -> Self {
        let payments = Arc::new(MockPaymentProcessor::new());
        let email = Arc::new(RecordingEmailProvider::new());
        let analysis = Arc::new(StaticAnalysisEngine::succeeding(
            ReportId::new("rpt_test_1").unwrap(),
            json!({
                "summary": { "employees": 3, "total_gross": 12000 },
                "findings": [{ "severity": "medium", "message": "Overtime not itemised" }]
            }),
        ));
        let state = AppState::in_memory(
            config,
            Collaborators {
                payments: Some(payments.clone()),
                email: Some(email.clone()),
                analysis: Some(analysis.clone()),
            },
        );
        Self {
            app: payaudit_api::app(state.clone()),
            state,
            payments,
            email,
            analysis,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn admin_get(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn admin_post(&self, uri: &str, body: Option<Value>) -> Response<Body> {
        let builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    pub async fn upload(&self, id: RequestId, file_name: &str, contents: &str) -> Response<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {contents}\r\n\
             --{BOUNDARY}--\r\n"
        );
        self.send(
            Request::builder()
                .method("POST")
                .uri(format!("/v1/requests/{id}/upload"))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Redeem a portal link as a JSON client.
    pub async fn redeem(&self, token: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(format!("/portal/access?token={token}"))
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Insert a request that has already paid.
    pub async fn seed_paid(&self, email: &str) -> AuditRequest {
        let now = Utc::now();
        let mut request = AuditRequest::new(
            "Acme Payroll Ltd".into(),
            "Jane Doe".into(),
            EmailAddress::new(email).unwrap(),
            now,
        );
        request
            .confirm_payment(
                &PaymentConfirmation {
                    session_id: format!("cs_seed_{}", request.id),
                    amount_cents: 29_900,
                    currency: "usd".into(),
                },
                now,
            )
            .unwrap();
        self.state.repo.insert(&request).await.unwrap();
        request
    }

    /// Insert a request that has not paid.
    pub async fn seed_pending(&self, email: &str) -> AuditRequest {
        let request = AuditRequest::new(
            "Acme Payroll Ltd".into(),
            "Jane Doe".into(),
            EmailAddress::new(email).unwrap(),
            Utc::now(),
        );
        self.state.repo.insert(&request).await.unwrap();
        request
    }

    pub async fn stored(&self, id: RequestId) -> AuditRequest {
        self.state.repo.get(id).await.unwrap().unwrap()
    }

    /// Poll the store until `done` holds, failing after about two seconds.
    pub async fn wait_for(&self, id: RequestId, done: impl Fn(&AuditRequest) -> bool) -> AuditRequest {
        for _ in 0..200 {
            let request = self.stored(id).await;
            if done(&request) {
                return request;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("request {id} never reached the expected state");
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Pull the raw token out of a portal link email.
pub fn token_from_html(html: &str) -> String {
    let start = html.find("token=").expect("email has no portal link") + "token=".len();
    html[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect()
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}

pub const SAMPLE_CSV: &str = "employee_id,name,gross_pay,hours\n\
                              E1,Alice,4000,160\n\
                              E2,Bob,4200,172\n\
                              E3,Carol,3800,150\n";

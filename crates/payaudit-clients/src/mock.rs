//! In-process collaborator implementations.
//!
//! Used by the API crate's tests and by local development when no
//! collaborator is configured. None of these touch the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use payaudit_core::ReportId;

use crate::analysis::{AnalysisEngine, AnalysisInput, AnalysisOutput};
use crate::email::{EmailMessage, EmailProvider};
use crate::error::ClientError;
use crate::payment::{CheckoutRequest, CheckoutSession, PaymentProcessor, SessionPaymentStatus};

// -- Payment ------------------------------------------------------------------

/// A processor that keeps sessions in memory. Sessions start unpaid;
/// tests call [`MockPaymentProcessor::mark_paid`] to simulate checkout.
#[derive(Debug, Default)]
pub struct MockPaymentProcessor {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    next_id: AtomicUsize,
}

impl MockPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a session paid. Returns `false` if the session is unknown.
    pub fn mark_paid(&self, session_id: &str) -> bool {
        match self.sessions.lock().get_mut(session_id) {
            Some(session) => {
                session.payment_status = SessionPaymentStatus::Paid;
                true
            }
            None => false,
        }
    }

    /// Insert an arbitrary session, e.g. one whose metadata points elsewhere.
    pub fn insert_session(&self, session: CheckoutSession) {
        self.sessions.lock().insert(session.id.clone(), session);
    }

    /// Number of sessions created through the trait.
    pub fn sessions_created(&self) -> usize {
        self.next_id.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_checkout_session(
        &self,
        req: &CheckoutRequest,
    ) -> Result<CheckoutSession, ClientError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_mock_{n}");
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.invalid/pay/{id}")),
            payment_status: SessionPaymentStatus::Unpaid,
            amount_total: Some(req.amount),
            currency: Some(req.currency.clone()),
            metadata: req.metadata.clone(),
        };
        self.sessions.lock().insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, ClientError> {
        Ok(self.sessions.lock().get(session_id).cloned())
    }
}

// -- Email --------------------------------------------------------------------

/// How [`RecordingEmailProvider`] answers a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendBehavior {
    /// Record and acknowledge.
    #[default]
    Accept,
    /// Answer `Ok(false)` without recording.
    Refuse,
    /// Answer with a transport-shaped error without recording.
    Fail,
}

/// An email provider that records accepted messages.
#[derive(Debug, Default)]
pub struct RecordingEmailProvider {
    sent: Mutex<Vec<EmailMessage>>,
    behavior: Mutex<SendBehavior>,
    attempts: AtomicUsize,
}

impl RecordingEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, behavior: SendBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Messages accepted so far, oldest first.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }

    /// Total calls to `send`, including refused and failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailProvider for RecordingEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<bool, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match *self.behavior.lock() {
            SendBehavior::Accept => {
                self.sent.lock().push(message.clone());
                Ok(true)
            }
            SendBehavior::Refuse => Ok(false),
            SendBehavior::Fail => Err(ClientError::Rejected {
                endpoint: "POST /emails".into(),
                reason: "simulated provider outage".into(),
            }),
        }
    }
}

// -- Analysis -----------------------------------------------------------------

/// An analysis engine that returns a fixed result.
#[derive(Debug)]
pub struct StaticAnalysisEngine {
    outcome: Mutex<Result<AnalysisOutput, String>>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<AnalysisInput>>,
}

impl StaticAnalysisEngine {
    /// Always succeed with `report_id` and `report`.
    pub fn succeeding(report_id: ReportId, report: serde_json::Value) -> Self {
        Self {
            outcome: Mutex::new(Ok(AnalysisOutput { report_id, report })),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Always fail with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Mutex::new(Err(reason.into())),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Switch the engine to succeed from now on.
    pub fn set_success(&self, report_id: ReportId, report: serde_json::Value) {
        *self.outcome.lock() = Ok(AnalysisOutput { report_id, report });
    }

    /// Switch the engine to fail with `reason` from now on.
    pub fn set_failure(&self, reason: impl Into<String>) {
        *self.outcome.lock() = Err(reason.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inputs received so far, oldest first.
    pub fn inputs(&self) -> Vec<AnalysisInput> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl AnalysisEngine for StaticAnalysisEngine {
    async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisOutput, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push(input.clone());
        self.outcome
            .lock()
            .clone()
            .map_err(|reason| ClientError::Rejected {
                endpoint: "POST /v1/analyze".into(),
                reason,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_payment_session_lifecycle() {
        let processor = MockPaymentProcessor::new();
        let req = CheckoutRequest {
            amount: 29_900,
            currency: "usd".into(),
            product_name: "Payroll audit".into(),
            customer_email: "a@b.io".into(),
            success_url: "http://x/success".into(),
            cancel_url: "http://x/cancel".into(),
            metadata: HashMap::from([("request_id".into(), "r".into())]),
        };
        let session = processor.create_checkout_session(&req).await.unwrap();
        assert!(!session.is_paid());
        assert!(processor.mark_paid(&session.id));
        let fetched = processor.retrieve_session(&session.id).await.unwrap().unwrap();
        assert!(fetched.is_paid());
        assert!(processor.retrieve_session("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recording_email_behaviors() {
        let provider = RecordingEmailProvider::new();
        let msg = EmailMessage {
            from: "f@x.io".into(),
            to: "t@x.io".into(),
            subject: "s".into(),
            html: "<p>h</p>".into(),
        };
        assert!(provider.send(&msg).await.unwrap());
        provider.set_behavior(SendBehavior::Refuse);
        assert!(!provider.send(&msg).await.unwrap());
        provider.set_behavior(SendBehavior::Fail);
        assert!(provider.send(&msg).await.is_err());
        assert_eq!(provider.sent().len(), 1);
        assert_eq!(provider.attempts(), 3);
    }
}

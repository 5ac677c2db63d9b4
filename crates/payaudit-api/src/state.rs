//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor and to the analysis worker.
//!
//! Collaborators are optional. An unconfigured payment processor makes
//! checkout fail with 503; an unconfigured email provider or analysis
//! engine is recorded on the affected request so reconciliation finds it.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use payaudit_clients::{AnalysisEngine, EmailProvider, PaymentProcessor};

use crate::config::AppConfig;
use crate::repository::{MemoryRepository, RequestRepository};
use crate::services::analysis::{self, AnalysisQueue};
use crate::services::locks::RequestLocks;

/// Default capacity of the analysis queue.
const QUEUE_CAPACITY: usize = 256;

/// External collaborators wired into the service.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub payments: Option<Arc<dyn PaymentProcessor>>,
    pub email: Option<Arc<dyn EmailProvider>>,
    pub analysis: Option<Arc<dyn AnalysisEngine>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("payments", &self.payments.is_some())
            .field("email", &self.email.is_some())
            .field("analysis", &self.analysis.is_some())
            .finish()
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Arc<dyn RequestRepository>,
    pub payments: Option<Arc<dyn PaymentProcessor>>,
    pub email: Option<Arc<dyn EmailProvider>>,
    pub analysis: Option<Arc<dyn AnalysisEngine>>,
    pub queue: AnalysisQueue,
    pub locks: RequestLocks,
    /// Present when the Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("payments", &self.payments.is_some())
            .field("email", &self.email.is_some())
            .field("analysis", &self.analysis.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl AppState {
    /// Build the state and spawn the analysis worker.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: AppConfig,
        repo: Arc<dyn RequestRepository>,
        collaborators: Collaborators,
    ) -> Self {
        let (queue, rx) = AnalysisQueue::bounded(QUEUE_CAPACITY);
        let state = Self {
            config: Arc::new(config),
            repo,
            payments: collaborators.payments,
            email: collaborators.email,
            analysis: collaborators.analysis,
            queue,
            locks: RequestLocks::new(),
            metrics: None,
        };
        analysis::spawn_worker(state.clone(), rx);
        state
    }

    /// State over an empty in-memory repository.
    pub fn in_memory(config: AppConfig, collaborators: Collaborators) -> Self {
        Self::new(config, Arc::new(MemoryRepository::new()), collaborators)
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

//! # Analysis Queue
//!
//! Uploads hand request ids to a bounded channel; one background worker
//! drains it. Each job analyses the stored dataset (unless a report already
//! exists) and then delivers the report. Every outcome is written back onto
//! the request, so a job that fails or never runs is visible to the
//! reconciliation scans rather than lost.

use chrono::Utc;
use payaudit_clients::{AnalysisInput, AnalysisOutput};
use payaudit_core::RequestId;
use payaudit_state::AuditStatus;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{delivery, load, mutate, ServiceError};
use crate::middleware::metrics as telemetry;
use crate::state::AppState;

const ENGINE: &str = "analysis engine";

/// Failure to hand a job to the worker.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("analysis queue is full")]
    Full,
    #[error("analysis worker has stopped")]
    Closed,
}

/// Sending half of the analysis queue.
#[derive(Debug, Clone)]
pub struct AnalysisQueue {
    tx: mpsc::Sender<RequestId>,
}

impl AnalysisQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<RequestId>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a job without waiting.
    pub fn enqueue(&self, id: RequestId) -> Result<(), QueueError> {
        self.tx.try_send(id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Report generated (now or earlier) and delivered.
    Delivered,
    /// Report exists but the email was not confirmed.
    Undelivered,
    /// The engine failed; the request is now `failed`.
    AnalysisFailed,
    /// Nothing to do: no dataset, not processing, or already delivered.
    Skipped,
}

/// Spawn the worker that drains `rx`.
pub fn spawn_worker(state: AppState, mut rx: mpsc::Receiver<RequestId>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(id) = rx.recv().await {
            match run_job(&state, id).await {
                Ok(outcome) => tracing::debug!(request_id = %id, ?outcome, "analysis job finished"),
                Err(e) => tracing::error!(request_id = %id, error = %e, "analysis job errored"),
            }
        }
        tracing::info!("analysis worker stopped");
    })
}

/// Run one job: analyse if needed, then deliver.
pub async fn run_job(state: &AppState, id: RequestId) -> Result<JobOutcome, ServiceError> {
    let _guard = state.locks.lock(id).await;
    let request = load(state, id).await?;

    if request.report.is_none() {
        if request.dataset.is_none() || request.status != AuditStatus::Processing {
            telemetry::analysis_job("skipped");
            tracing::info!(request_id = %id, status = %request.status, "analysis job has nothing to analyse");
            return Ok(JobOutcome::Skipped);
        }
        match analyze(state, id).await {
            Ok(output) => {
                mutate(state, id, move |r| {
                    r.record_report(output.report_id, output.report, Utc::now())
                })
                .await?;
                telemetry::analysis_job("reported");
                tracing::info!(request_id = %id, "report generated");
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(request_id = %id, error = %reason, "analysis failed");
                mutate(state, id, move |r| r.record_analysis_failure(reason, Utc::now())).await?;
                telemetry::analysis_job("failed");
                return Ok(JobOutcome::AnalysisFailed);
            }
        }
    } else if request.report_delivered {
        telemetry::analysis_job("skipped");
        return Ok(JobOutcome::Skipped);
    }

    match delivery::deliver_locked(state, id).await {
        Ok(_) => Ok(JobOutcome::Delivered),
        Err(ServiceError::DeliveryFailed { .. }) => Ok(JobOutcome::Undelivered),
        Err(e) => Err(e),
    }
}

/// Call the analysis engine for `id`, loading the stored dataset itself.
pub async fn analyze(state: &AppState, id: RequestId) -> Result<AnalysisOutput, ServiceError> {
    let engine = state
        .analysis
        .as_ref()
        .ok_or(ServiceError::NotConfigured(ENGINE))?;
    let request = load(state, id).await?;
    let dataset = request
        .dataset
        .ok_or_else(|| ServiceError::Conflict(format!("request {id} has no uploaded dataset")))?;
    let input = AnalysisInput {
        request_id: id,
        company_name: request.company_name,
        columns: dataset.columns,
        row_count: dataset.row_count,
        csv_data: dataset.csv_data,
    };
    engine
        .analyze(&input)
        .await
        .map_err(|e| ServiceError::external(ENGINE, e))
}

//! # Reconciliation Subcommands
//!
//! - `missing-reports`: paid requests with no report; `--apply` re-queues
//!   failed and stalled analyses and lists the ones still running.
//! - `undelivered`: reports that never reached the customer; `--apply`
//!   resends each one.
//!
//! Without `--apply` both commands only read.

use anyhow::Result;
use clap::Args;
use serde_json::Value;

use crate::client::AdminClient;
use crate::output::{self, field, Format};

/// Arguments shared by the reconciliation subcommands.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Perform the repair instead of only listing.
    #[arg(long)]
    pub apply: bool,
}

pub async fn run_missing_reports(
    client: &AdminClient,
    args: &ReconcileArgs,
    format: Format,
) -> Result<u8> {
    if !args.apply {
        let scan = client.get("/v1/admin/requests/without-report").await?;
        output::print(format, &scan, render_missing);
        return Ok(0);
    }

    let outcome = client.post("/v1/admin/reconcile/missing-reports", None).await?;
    output::print(format, &outcome, render_reconciled);
    let failures = outcome["errors"].as_array().map_or(0, Vec::len);
    Ok(if failures > 0 { 2 } else { 0 })
}

pub async fn run_undelivered(
    client: &AdminClient,
    args: &ReconcileArgs,
    format: Format,
) -> Result<u8> {
    if !args.apply {
        let scan = client.get("/v1/admin/requests/undelivered").await?;
        output::print(format, &scan, render_undelivered);
        return Ok(0);
    }

    let results = client.post("/v1/admin/reconcile/undelivered", None).await?;
    output::print(format, &results, render_resends);
    let failed = results
        .as_array()
        .map_or(0, |r| r.iter().filter(|x| x["delivered"] != true).count());
    Ok(if failed > 0 { 2 } else { 0 })
}

fn rows(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn render_missing(scan: &Value) -> String {
    let items = rows(scan);
    if items.is_empty() {
        return "Every paid request has a report.".to_string();
    }
    let table = output::table(
        &["REQUEST", "REASON", "STATUS", "EMAIL", "PAID", "ERROR"],
        &items
            .iter()
            .map(|m| {
                vec![
                    field(m, "request_id"),
                    field(m, "reason"),
                    field(m, "status"),
                    field(m, "customer_email"),
                    field(m, "paid_at"),
                    field(m, "processing_error"),
                ]
            })
            .collect::<Vec<_>>(),
    );
    format!("{table}\n\n{} paid request(s) without a report.", items.len())
}

fn render_reconciled(outcome: &Value) -> String {
    let mut lines = Vec::new();
    for id in rows(&outcome["requeued"]) {
        lines.push(format!("requeued         {}", id.as_str().unwrap_or_default()));
    }
    for id in rows(&outcome["already_resolved"]) {
        lines.push(format!("already resolved {}", id.as_str().unwrap_or_default()));
    }
    for summary in rows(&outcome["awaiting_upload"]) {
        lines.push(format!(
            "awaiting upload  {} ({})",
            field(summary, "request_id"),
            field(summary, "customer_email")
        ));
    }
    for summary in rows(&outcome["in_progress"]) {
        lines.push(format!(
            "still running    {} (since {})",
            field(summary, "request_id"),
            field(summary, "processing_started_at")
        ));
    }
    for failure in rows(&outcome["errors"]) {
        lines.push(format!(
            "error            {}: {}",
            field(failure, "request_id"),
            field(failure, "error")
        ));
    }
    if lines.is_empty() {
        return "Nothing to reconcile.".to_string();
    }
    lines.join("\n")
}

fn render_undelivered(scan: &Value) -> String {
    let items = rows(scan);
    if items.is_empty() {
        return "Every report has been delivered.".to_string();
    }
    let table = output::table(
        &["REQUEST", "EMAIL", "REPORT", "LAST ERROR"],
        &items
            .iter()
            .map(|r| {
                vec![
                    field(r, "request_id"),
                    field(r, "customer_email"),
                    field(r, "report_id"),
                    field(r, "last_delivery_error"),
                ]
            })
            .collect::<Vec<_>>(),
    );
    format!("{table}\n\n{} undelivered report(s).", items.len())
}

pub(crate) fn render_resends(results: &Value) -> String {
    let items = rows(results);
    if items.is_empty() {
        return "No undelivered reports.".to_string();
    }
    items
        .iter()
        .map(|r| {
            if r["delivered"] == true {
                format!("delivered  {} -> {}", field(r, "request_id"), field(r, "email"))
            } else {
                format!(
                    "FAILED     {} -> {}: {}",
                    field(r, "request_id"),
                    field(r, "email"),
                    field(r, "error")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

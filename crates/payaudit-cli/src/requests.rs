//! # Single-Request Subcommands
//!
//! Inspect one request, resend its report, correct its address, or find
//! requests by customer email.

use anyhow::Result;
use clap::Args;
use serde_json::{json, Value};

use crate::client::AdminClient;
use crate::output::{self, field, Format};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Request ID.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ResendArgs {
    /// Request ID.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct CorrectEmailArgs {
    /// Request ID.
    pub id: String,
    /// Corrected customer address.
    pub email: String,
}

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Customer address to search for.
    pub email: String,
    /// Also match the same local part and addresses within two edits.
    #[arg(long)]
    pub fuzzy: bool,
}

pub async fn run_show(client: &AdminClient, args: &ShowArgs, format: Format) -> Result<u8> {
    let summary = client.get(&format!("/v1/admin/requests/{}", args.id)).await?;
    output::print(format, &summary, render_summary);
    Ok(0)
}

pub async fn run_resend(client: &AdminClient, args: &ResendArgs, format: Format) -> Result<u8> {
    let result = client
        .post(&format!("/v1/admin/requests/{}/resend", args.id), None)
        .await?;
    output::print(format, &result, |r| {
        crate::reconcile::render_resends(&Value::Array(vec![r.clone()]))
    });
    Ok(if result["delivered"] == true { 0 } else { 2 })
}

pub async fn run_correct_email(
    client: &AdminClient,
    args: &CorrectEmailArgs,
    format: Format,
) -> Result<u8> {
    let result = client
        .post(
            &format!("/v1/admin/requests/{}/correct-email", args.id),
            Some(json!({ "email": args.email })),
        )
        .await?;
    output::print(format, &result, |r| {
        format!(
            "{} -> {}\n{}",
            field(r, "previous_email"),
            field(r, "email"),
            field(r, "message")
        )
    });
    let failed = result["resent"] == true && result["delivered"] != true;
    Ok(if failed { 2 } else { 0 })
}

pub async fn run_find(client: &AdminClient, args: &FindArgs, format: Format) -> Result<u8> {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("email", &args.email)
        .append_pair("fuzzy", if args.fuzzy { "true" } else { "false" })
        .finish();

    let hits = client
        .get(&format!("/v1/admin/requests/search?{query}"))
        .await?;
    output::print(format, &hits, render_hits);
    Ok(0)
}

fn render_summary(r: &Value) -> String {
    [
        ("Request", "request_id"),
        ("Company", "company_name"),
        ("Contact", "contact_name"),
        ("Email", "customer_email"),
        ("Status", "status"),
        ("Paid at", "paid_at"),
        ("Session", "payment_session_id"),
        ("Rows", "row_count"),
        ("File", "original_file_name"),
        ("Processing since", "processing_started_at"),
        ("Processing error", "processing_error"),
        ("Report", "report_id"),
        ("Delivered", "report_delivered"),
        ("Delivered at", "report_delivered_at"),
        ("Delivery error", "last_delivery_error"),
        ("Created", "created_at"),
        ("Updated", "updated_at"),
    ]
    .iter()
    .map(|(label, key)| format!("{label:<17} {}", field(r, key)))
    .collect::<Vec<_>>()
    .join("\n")
}

fn render_hits(hits: &Value) -> String {
    let items = hits.as_array().map(Vec::as_slice).unwrap_or(&[]);
    if items.is_empty() {
        return "No matching requests.".to_string();
    }
    output::table(
        &["MATCH", "REQUEST", "EMAIL", "COMPANY", "STATUS", "CREATED"],
        &items
            .iter()
            .map(|h| {
                vec![
                    field(h, "match_kind"),
                    field(h, "request_id"),
                    field(h, "customer_email"),
                    field(h, "company_name"),
                    field(h, "status"),
                    field(h, "created_at"),
                ]
            })
            .collect::<Vec<_>>(),
    )
}

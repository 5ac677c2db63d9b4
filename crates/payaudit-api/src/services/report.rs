//! HTML rendering for outgoing emails: the audit report and the portal link.
//!
//! Every interpolated value passes through [`escape_html`]; report payloads
//! come from an external engine and customer names from a public form.

use chrono::{DateTime, Utc};
use payaudit_state::{AuditRequest, GeneratedReport};
use serde_json::Value;

/// Maximum number of findings listed in the email body.
const MAX_FINDINGS: usize = 25;

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn report_subject(request: &AuditRequest) -> String {
    format!("Your payroll audit report: {}", request.company_name)
}

/// Render the report document sent as the delivery email body.
pub fn render_report_html(request: &AuditRequest, report: &GeneratedReport) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"font-family:sans-serif\">");
    html.push_str(&format!(
        "<h1>Payroll Audit Report</h1><p>Prepared for <strong>{}</strong></p>",
        escape_html(&request.company_name)
    ));
    html.push_str(&format!(
        "<p>Report ID: <code>{}</code><br>Generated: {}</p>",
        escape_html(report.report_id.as_str()),
        report.generated_at.format("%B %-d, %Y")
    ));
    if let Some(dataset) = &request.dataset {
        html.push_str(&format!(
            "<p>Source file: {} ({} rows, {} columns)</p>",
            escape_html(&dataset.original_file_name),
            dataset.row_count,
            dataset.columns.len()
        ));
    }

    let metrics = summary_metrics(&report.data);
    if !metrics.is_empty() {
        html.push_str("<h2>Summary</h2><table cellpadding=\"4\">");
        for (name, value) in metrics {
            html.push_str(&format!(
                "<tr><td>{}</td><td><strong>{}</strong></td></tr>",
                escape_html(&humanize(&name)),
                escape_html(&value)
            ));
        }
        html.push_str("</table>");
    }

    let findings = findings(&report.data);
    if !findings.is_empty() {
        html.push_str("<h2>Findings</h2><ul>");
        for finding in findings.iter().take(MAX_FINDINGS) {
            html.push_str(&format!("<li>{}</li>", escape_html(finding)));
        }
        html.push_str("</ul>");
        if findings.len() > MAX_FINDINGS {
            html.push_str(&format!(
                "<p>and {} more.</p>",
                findings.len() - MAX_FINDINGS
            ));
        }
    }

    html.push_str(&format!(
        "<p>Thank you, {}.</p></body></html>",
        escape_html(&request.contact_name)
    ));
    html
}

/// Render the portal-link email.
pub fn render_portal_link_html(
    request: &AuditRequest,
    link: &str,
    expires_at: DateTime<Utc>,
) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family:sans-serif\">\
         <p>Hello {contact},</p>\
         <p>Here is your secure link to the payroll audit portal for {company}:</p>\
         <p><a href=\"{link}\">Open the audit portal</a></p>\
         <p>The link works once and expires on {expires} UTC. \
         If it has expired or was already used, request a new link.</p>\
         </body></html>",
        contact = escape_html(&request.contact_name),
        company = escape_html(&request.company_name),
        link = escape_html(link),
        expires = expires_at.format("%Y-%m-%d %H:%M"),
    )
}

/// Scalar metrics from `data.summary`, or from the top level when there is
/// no summary object. Sorted by name.
fn summary_metrics(data: &Value) -> Vec<(String, String)> {
    let source = match data.get("summary") {
        Some(Value::Object(map)) => map,
        _ => match data {
            Value::Object(map) => map,
            _ => return Vec::new(),
        },
    };
    let mut out: Vec<(String, String)> = source
        .iter()
        .filter_map(|(k, v)| scalar_text(v).map(|text| (k.clone(), text)))
        .collect();
    out.sort();
    out
}

/// Finding lines from `data.findings` (or `data.issues`): strings as-is,
/// objects by their `title`/`description`/`message`.
fn findings(data: &Value) -> Vec<String> {
    let Some(Value::Array(items)) = data.get("findings").or_else(|| data.get("issues")) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => ["title", "description", "message"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "yes" } else { "no" }.to_string()),
        _ => None,
    }
}

fn humanize(key: &str) -> String {
    let spaced = key.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

//! # Ingestion Pipeline
//!
//! Validates an uploaded payroll file, stores it on the request, and hands
//! the request to the analysis queue. The HTTP caller gets "accepted,
//! processing" back before analysis starts.
//!
//! Validation happens entirely before the repository write. A rejected file
//! leaves the request exactly as it was.

use chrono::{DateTime, Utc};
use payaudit_core::RequestId;
use payaudit_state::UploadedDataset;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{load, mutate, ServiceError, UploadIssue};
use crate::middleware::metrics as telemetry;
use crate::state::AppState;

/// Maximum number of row/field issues reported for one file.
const MAX_ISSUES: usize = 20;

const ALLOWED_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];

const ALLOWED_CONTENT_TYPES: [&str; 6] = [
    "text/csv",
    "application/csv",
    "text/tab-separated-values",
    "text/plain",
    "application/vnd.ms-excel",
    "application/octet-stream",
];

/// A file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Response to an accepted upload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadAccepted {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    /// Always `processing`; analysis runs in the background.
    pub status: String,
    pub row_count: u64,
    pub columns: Vec<String>,
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::InvalidUpload {
        message: message.into(),
        issues: Vec::new(),
    }
}

fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Parse and validate an upload into a dataset.
///
/// Accepts comma-delimited files, or tab-delimited when the extension is
/// `.tsv` or the content type says so. A header row is required and must
/// name every column exactly once.
pub fn parse_dataset(
    file: &UploadedFile,
    max_bytes: usize,
    now: DateTime<Utc>,
) -> Result<UploadedDataset, ServiceError> {
    if file.bytes.is_empty() {
        return Err(invalid("file is empty"));
    }
    if file.bytes.len() > max_bytes {
        return Err(invalid(format!(
            "file is {} bytes; the limit is {max_bytes} bytes",
            file.bytes.len()
        )));
    }

    let ext = extension(&file.file_name);
    let content_type = file
        .content_type
        .as_deref()
        .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase());
    let type_ok = match (&ext, &content_type) {
        (Some(ext), _) => ALLOWED_EXTENSIONS.contains(&ext.as_str()),
        (None, Some(ct)) => ALLOWED_CONTENT_TYPES.contains(&ct.as_str()),
        (None, None) => false,
    };
    if !type_ok {
        return Err(invalid(format!(
            "unsupported file type for {:?}; upload a .csv, .tsv or .txt file",
            file.file_name
        )));
    }

    let text = std::str::from_utf8(&file.bytes)
        .map_err(|e| invalid(format!("file is not valid UTF-8 text: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let tab_separated = ext.as_deref() == Some("tsv")
        || content_type.as_deref() == Some("text/tab-separated-values");
    let delimiter = if tab_separated { b'\t' } else { b',' };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| invalid(format!("header row could not be read: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut issues = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (index, name) in columns.iter().enumerate() {
        if name.is_empty() {
            issues.push(UploadIssue {
                row: Some(1),
                field: None,
                message: format!("column {} has an empty header", index + 1),
            });
        } else if !seen.insert(name.as_str()) {
            issues.push(UploadIssue {
                row: Some(1),
                field: Some(name.clone()),
                message: format!("duplicate column {name:?}"),
            });
        }
    }
    if columns.iter().all(String::is_empty) {
        return Err(invalid("header row is blank"));
    }
    if !issues.is_empty() {
        return Err(ServiceError::InvalidUpload {
            message: "header row is invalid".into(),
            issues,
        });
    }

    let mut row_count: u64 = 0;
    let mut bad_rows: u64 = 0;
    for record in reader.records() {
        match record {
            Ok(_) => row_count += 1,
            Err(err) => {
                bad_rows += 1;
                if issues.len() < MAX_ISSUES {
                    issues.push(record_issue(&err));
                }
            }
        }
    }

    if bad_rows > 0 {
        return Err(ServiceError::InvalidUpload {
            message: format!("{bad_rows} row(s) could not be parsed"),
            issues,
        });
    }
    if row_count == 0 {
        return Err(invalid("file has a header row but no data rows"));
    }

    Ok(UploadedDataset {
        csv_data: text.to_string(),
        row_count,
        columns,
        original_file_name: file.file_name.clone(),
        file_size: file.bytes.len() as u64,
        uploaded_at: now,
    })
}

fn record_issue(err: &csv::Error) -> UploadIssue {
    let row = err.position().map(|p| p.line());
    let message = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {expected_len} fields, found {len}"),
        _ => err.to_string(),
    };
    UploadIssue {
        row,
        field: None,
        message,
    }
}

/// Accept an upload for a paid request and queue it for analysis.
pub async fn accept_upload(
    state: &AppState,
    id: RequestId,
    file: UploadedFile,
    now: DateTime<Utc>,
) -> Result<UploadAccepted, ServiceError> {
    // The payment gate is checked before the file is even parsed.
    let current = load(state, id).await?;
    if let Err(e) = current.check_upload_allowed() {
        let err = ServiceError::from(e);
        if matches!(err, ServiceError::PaymentRequired(_)) {
            telemetry::upload("payment_required");
            tracing::warn!(request_id = %id, status = %current.status, "upload before payment rejected");
        }
        return Err(err);
    }

    let dataset = match parse_dataset(&file, state.config.max_upload_bytes, now) {
        Ok(dataset) => dataset,
        Err(err) => {
            telemetry::upload("rejected");
            tracing::info!(request_id = %id, file = %file.file_name, error = %err, "upload rejected");
            return Err(err);
        }
    };
    let row_count = dataset.row_count;
    let columns = dataset.columns.clone();

    let guard = state.locks.lock(id).await;
    let stored = mutate(state, id, move |r| r.record_upload(dataset, now)).await?;
    drop(guard);

    if let Err(e) = state.queue.enqueue(id) {
        tracing::error!(request_id = %id, error = %e, "failed to queue analysis");
        let reason = format!("analysis not queued: {e}");
        mutate(state, id, move |r| {
            r.note_processing_error(reason, now);
            Ok(())
        })
        .await?;
    }

    telemetry::upload("accepted");
    tracing::info!(request_id = %id, row_count, file = %file.file_name, "upload accepted");
    Ok(UploadAccepted {
        request_id: id,
        status: stored.status.as_str().to_string(),
        row_count,
        columns,
    })
}

//! # Error Types -- Validation Error Hierarchy
//!
//! Validation errors raised by domain-primitive constructors. Each variant
//! names the offending input so the API layer can return it verbatim in a
//! 422 response.

use thiserror::Error;

/// A domain primitive rejected its input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The value is not a syntactically valid email address.
    #[error("invalid email address {0:?}")]
    InvalidEmail(String),

    /// A report identifier was empty or too long.
    #[error("invalid report id {0:?}: must be 1-128 printable characters")]
    InvalidReportId(String),

    /// A request identifier could not be parsed.
    #[error("invalid request id {0:?}")]
    InvalidRequestId(String),

    /// A required free-text field was empty or exceeded its length limit.
    #[error("field {field} must be 1-{max} characters")]
    InvalidText {
        /// Field name as exposed in the API.
        field: &'static str,
        /// Maximum accepted length.
        max: usize,
    },
}

/// Validate a required free-text field, returning the trimmed value.
pub fn require_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > max {
        return Err(ValidationError::InvalidText { field, max });
    }
    Ok(trimmed.to_string())
}

//! # Email Addresses
//!
//! [`EmailAddress`] is the validated destination of portal links and report
//! deliveries. Addresses are trimmed and lowercased at construction, so two
//! spellings that differ only in case compare equal.
//!
//! [`EmailAddress::match_against`] classifies how close another address is.
//! Operators use it to locate requests whose report went to a mistyped
//! address before running a correction.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A syntactically valid, normalized email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

/// How closely a candidate address matches a searched address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailMatch {
    /// Identical after normalization.
    Exact,
    /// Same local part, different domain (e.g. `gmial.com` vs `gmail.com`).
    SameLocalPart,
    /// Within a small edit distance of the searched address.
    Near,
}

impl EmailAddress {
    const MAX_LEN: usize = 254;

    /// Maximum edit distance accepted as a [`EmailMatch::Near`] match.
    pub const NEAR_DISTANCE: usize = 2;

    /// Parse and normalize an email address.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEmail`] unless the value has exactly
    /// one `@`, a non-empty local part, a dotted domain with non-empty labels,
    /// no whitespace, and is at most 254 characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let normalized = raw.trim().to_lowercase();
        if Self::is_well_formed(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(ValidationError::InvalidEmail(raw))
        }
    }

    fn is_well_formed(s: &str) -> bool {
        if s.is_empty() || s.len() > Self::MAX_LEN || s.chars().any(char::is_whitespace) {
            return false;
        }
        let mut parts = s.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => return false,
        };
        !local.is_empty()
            && domain.contains('.')
            && domain.split('.').all(|label| !label.is_empty())
    }

    /// The normalized address.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@`.
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }

    /// The part after `@`.
    pub fn domain(&self) -> &str {
        self.0.rsplit('@').next().unwrap_or_default()
    }

    /// Classify `candidate` against this (searched) address.
    ///
    /// Returns `None` when the addresses are unrelated.
    pub fn match_against(&self, candidate: &EmailAddress) -> Option<EmailMatch> {
        if self == candidate {
            return Some(EmailMatch::Exact);
        }
        if self.local_part() == candidate.local_part() {
            return Some(EmailMatch::SameLocalPart);
        }
        if strsim::levenshtein(self.as_str(), candidate.as_str()) <= Self::NEAR_DISTANCE {
            return Some(EmailMatch::Near);
        }
        None
    }
}

impl<'de> Deserialize<'de> for EmailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
